use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("store id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
        source: uuid::Error,
    },
    #[snafu(display("failed to create store directory at {path}"))]
    CreateStoreDirectory {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize '{namespace}' snapshot"))]
    SerializeSnapshot {
        stage: &'static str,
        namespace: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write snapshot file at {path}"))]
    WriteSnapshot {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to replace snapshot file from {from} to {to}"))]
    ReplaceSnapshot {
        stage: &'static str,
        from: String,
        to: String,
        source: std::io::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;
