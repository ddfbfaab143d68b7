//! Frontend (client->server) message construction.
//!
//! Every `write_*` function appends a complete, length-prefixed message to
//! `buf`. Parameter/column formats are always binary (`1i16`) per spec.md
//! §4.2 ("Parameter encoding is binary by default").

use bytes::BufMut;
use pgconduit_core::io::{patch_length_prefix, put_cstr, reserve_length_prefix};

const PROTOCOL_VERSION_3_0: i32 = 0x0003_0000;
const SSL_REQUEST_CODE: i32 = 80877103;
const CANCEL_REQUEST_CODE: i32 = 80877102;

pub fn write_ssl_request(buf: &mut Vec<u8>) {
    buf.put_i32(8);
    buf.put_i32(SSL_REQUEST_CODE);
}

pub fn write_cancel_request(buf: &mut Vec<u8>, process_id: u32, secret_key: u32) {
    buf.put_i32(16);
    buf.put_i32(CANCEL_REQUEST_CODE);
    buf.put_u32(process_id);
    buf.put_u32(secret_key);
}

pub fn write_startup(
    buf: &mut Vec<u8>,
    user: &str,
    database: &str,
    application_name: Option<&str>,
    options: Option<&str>,
) {
    let pos = reserve_length_prefix(buf);
    buf.put_i32(PROTOCOL_VERSION_3_0);

    put_cstr(buf, "user");
    put_cstr(buf, user);
    put_cstr(buf, "database");
    put_cstr(buf, database);
    put_cstr(buf, "replication");
    put_cstr(buf, "off");

    if let Some(name) = application_name {
        put_cstr(buf, "application_name");
        put_cstr(buf, name);
    }
    if let Some(options) = options {
        put_cstr(buf, "options");
        put_cstr(buf, options);
    }
    buf.put_u8(0);

    patch_length_prefix(buf, pos);
}

fn write_tagged(buf: &mut Vec<u8>, tag: u8, body: impl FnOnce(&mut Vec<u8>)) {
    buf.put_u8(tag);
    let pos = reserve_length_prefix(buf);
    body(buf);
    patch_length_prefix(buf, pos);
}

pub fn write_password(buf: &mut Vec<u8>, password: &str) {
    write_tagged(buf, b'p', |buf| put_cstr(buf, password));
}

pub fn write_sasl_initial_response(buf: &mut Vec<u8>, mechanism: &str, data: &[u8]) {
    write_tagged(buf, b'p', |buf| {
        put_cstr(buf, mechanism);
        buf.put_i32(data.len() as i32);
        buf.put_slice(data);
    });
}

pub fn write_sasl_response(buf: &mut Vec<u8>, data: &[u8]) {
    write_tagged(buf, b'p', |buf| buf.put_slice(data));
}

pub fn write_query(buf: &mut Vec<u8>, sql: &str) {
    write_tagged(buf, b'Q', |buf| put_cstr(buf, sql));
}

pub fn write_parse(buf: &mut Vec<u8>, statement: &str, sql: &str, param_oids: &[u32]) {
    write_tagged(buf, b'P', |buf| {
        put_cstr(buf, statement);
        put_cstr(buf, sql);
        buf.put_i16(param_oids.len() as i16);
        for oid in param_oids {
            buf.put_u32(*oid);
        }
    });
}

/// `params`: pre-encoded binary parameter bytes, or `None` for SQL NULL.
pub fn write_bind(
    buf: &mut Vec<u8>,
    portal: &str,
    statement: &str,
    params: &[Option<Vec<u8>>],
    result_binary: bool,
) {
    write_tagged(buf, b'B', |buf| {
        put_cstr(buf, portal);
        put_cstr(buf, statement);

        buf.put_i16(1);
        buf.put_i16(1); // all parameters binary

        buf.put_i16(params.len() as i16);
        for param in params {
            match param {
                Some(bytes) => {
                    buf.put_i32(bytes.len() as i32);
                    buf.put_slice(bytes);
                }
                None => buf.put_i32(-1),
            }
        }

        buf.put_i16(1);
        buf.put_i16(result_binary as i16);
    });
}

#[derive(Debug, Clone, Copy)]
pub enum DescribeTarget {
    Statement,
    Portal,
}

pub fn write_describe(buf: &mut Vec<u8>, target: DescribeTarget, name: &str) {
    write_tagged(buf, b'D', |buf| {
        buf.put_u8(match target {
            DescribeTarget::Statement => b'S',
            DescribeTarget::Portal => b'P',
        });
        put_cstr(buf, name);
    });
}

pub fn write_execute(buf: &mut Vec<u8>, portal: &str, max_rows: i32) {
    write_tagged(buf, b'E', |buf| {
        put_cstr(buf, portal);
        buf.put_i32(max_rows);
    });
}

pub fn write_sync(buf: &mut Vec<u8>) {
    buf.put_u8(b'S');
    buf.put_i32(4);
}

pub fn write_flush(buf: &mut Vec<u8>) {
    buf.put_u8(b'H');
    buf.put_i32(4);
}

#[derive(Debug, Clone, Copy)]
pub enum CloseTarget {
    Statement,
    Portal,
}

pub fn write_close(buf: &mut Vec<u8>, target: CloseTarget, name: &str) {
    write_tagged(buf, b'C', |buf| {
        buf.put_u8(match target {
            CloseTarget::Statement => b'S',
            CloseTarget::Portal => b'P',
        });
        put_cstr(buf, name);
    });
}

pub fn write_copy_data(buf: &mut Vec<u8>, data: &[u8]) {
    write_tagged(buf, b'd', |buf| buf.put_slice(data));
}

pub fn write_copy_done(buf: &mut Vec<u8>) {
    buf.put_u8(b'c');
    buf.put_i32(4);
}

pub fn write_copy_fail(buf: &mut Vec<u8>, message: &str) {
    write_tagged(buf, b'f', |buf| put_cstr(buf, message));
}

pub fn write_terminate(buf: &mut Vec<u8>) {
    buf.put_u8(b'X');
    buf.put_i32(4);
}
