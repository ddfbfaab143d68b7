pub mod backend;
pub mod codec;
pub mod frontend;
pub mod scram;

pub use backend::{BackendMessage, DatabaseErrorInfo, TransactionStatus};
pub use codec::{BackendMessageFormat, PgCodec, RawMessage};
