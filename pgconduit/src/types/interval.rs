/// Wire-accurate representation of `INTERVAL`: microseconds, days, and
/// months are kept separate because they are not fungible (a "month" has no
/// fixed length in microseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PgInterval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}
