//! Wire codec: type OIDs, the host-level [`value::Value`]/[`value::ParamValue`]
//! representations, and the encode/decode paths between them.

pub mod decode;
pub mod encode;
pub mod geometric;
pub mod interval;
pub mod oid;
pub mod type_info;
pub mod value;

pub use decode::{decode, TypeResolver};
pub use encode::encode;
pub use geometric::{PgBox, PgCircle, PgLSeg, PgLine, PgPath, PgPoint, PgPolygon};
pub use interval::PgInterval;
pub use type_info::{TypeInfo, TypeKind};
pub use value::{extra, ParamValue, Value};
