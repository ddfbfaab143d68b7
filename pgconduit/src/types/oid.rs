//! Well-known PostgreSQL type OIDs (`pg_type.oid` for built-in types), used
//! to pick an encode/decode path without a catalog round-trip. Values taken
//! from `pg_type.dat` in the PostgreSQL source tree.

pub const BOOL: u32 = 16;
pub const BYTEA: u32 = 17;
pub const CHAR: u32 = 18;
pub const NAME: u32 = 19;
pub const INT8: u32 = 20;
pub const INT2: u32 = 21;
pub const INT4: u32 = 23;
pub const TEXT: u32 = 25;
pub const JSON: u32 = 114;
pub const XML: u32 = 142;
pub const POINT: u32 = 600;
pub const LSEG: u32 = 601;
pub const PATH: u32 = 602;
pub const BOX: u32 = 603;
pub const POLYGON: u32 = 604;
pub const LINE: u32 = 628;
pub const FLOAT4: u32 = 700;
pub const FLOAT8: u32 = 701;
pub const CIRCLE: u32 = 718;
pub const MONEY: u32 = 790;
pub const MACADDR: u32 = 829;
pub const INET: u32 = 869;
pub const CIDR: u32 = 650;
pub const BPCHAR: u32 = 1042;
pub const VARCHAR: u32 = 1043;
pub const DATE: u32 = 1082;
pub const TIME: u32 = 1083;
pub const TIMESTAMP: u32 = 1114;
pub const TIMESTAMPTZ: u32 = 1184;
pub const INTERVAL: u32 = 1186;
pub const NUMERIC: u32 = 1700;
pub const UUID: u32 = 2950;
pub const JSONB: u32 = 3802;
pub const MACADDR8: u32 = 774;

pub const BOOL_ARRAY: u32 = 1000;
pub const BYTEA_ARRAY: u32 = 1001;
pub const INT2_ARRAY: u32 = 1005;
pub const INT4_ARRAY: u32 = 1007;
pub const TEXT_ARRAY: u32 = 1009;
pub const INT8_ARRAY: u32 = 1016;
pub const FLOAT4_ARRAY: u32 = 1021;
pub const FLOAT8_ARRAY: u32 = 1022;
pub const VARCHAR_ARRAY: u32 = 1015;
pub const UUID_ARRAY: u32 = 2951;
pub const JSON_ARRAY: u32 = 199;
pub const JSONB_ARRAY: u32 = 3807;
pub const NUMERIC_ARRAY: u32 = 1231;
pub const DATE_ARRAY: u32 = 1182;
pub const TIMESTAMP_ARRAY: u32 = 1115;
pub const TIMESTAMPTZ_ARRAY: u32 = 1185;

/// Returns the element OID for a known array type OID, used to recurse into
/// array encode/decode.
pub fn array_element(array_oid: u32) -> Option<u32> {
    Some(match array_oid {
        BOOL_ARRAY => BOOL,
        BYTEA_ARRAY => BYTEA,
        INT2_ARRAY => INT2,
        INT4_ARRAY => INT4,
        INT8_ARRAY => INT8,
        TEXT_ARRAY => TEXT,
        VARCHAR_ARRAY => VARCHAR,
        FLOAT4_ARRAY => FLOAT4,
        FLOAT8_ARRAY => FLOAT8,
        UUID_ARRAY => UUID,
        JSON_ARRAY => JSON,
        JSONB_ARRAY => JSONB,
        NUMERIC_ARRAY => NUMERIC,
        DATE_ARRAY => DATE,
        TIMESTAMP_ARRAY => TIMESTAMP,
        TIMESTAMPTZ_ARRAY => TIMESTAMPTZ,
        _ => return None,
    })
}

/// Whether `oid` has a hardcoded encode/decode path, i.e. does not need a
/// `pg_type` catalog lookup.
pub fn is_builtin(oid: u32) -> bool {
    array_element(oid).is_some()
        || matches!(
            oid,
            BOOL | BYTEA
                | CHAR
                | NAME
                | INT8
                | INT2
                | INT4
                | TEXT
                | JSON
                | XML
                | POINT
                | LSEG
                | PATH
                | BOX
                | POLYGON
                | LINE
                | FLOAT4
                | FLOAT8
                | CIRCLE
                | MONEY
                | MACADDR
                | INET
                | CIDR
                | BPCHAR
                | VARCHAR
                | DATE
                | TIME
                | TIMESTAMP
                | TIMESTAMPTZ
                | INTERVAL
                | NUMERIC
                | UUID
                | JSONB
                | MACADDR8
        )
}

/// Returns the array OID that wraps `element_oid`, the inverse of
/// [`array_element`], used when encoding a Rust `Vec` against a target OID.
pub fn array_of(element_oid: u32) -> Option<u32> {
    Some(match element_oid {
        BOOL => BOOL_ARRAY,
        BYTEA => BYTEA_ARRAY,
        INT2 => INT2_ARRAY,
        INT4 => INT4_ARRAY,
        INT8 => INT8_ARRAY,
        TEXT => TEXT_ARRAY,
        VARCHAR => VARCHAR_ARRAY,
        FLOAT4 => FLOAT4_ARRAY,
        FLOAT8 => FLOAT8_ARRAY,
        UUID => UUID_ARRAY,
        JSON => JSON_ARRAY,
        JSONB => JSONB_ARRAY,
        NUMERIC => NUMERIC_ARRAY,
        DATE => DATE_ARRAY,
        TIMESTAMP => TIMESTAMP_ARRAY,
        TIMESTAMPTZ => TIMESTAMPTZ_ARRAY,
        _ => return None,
    })
}
