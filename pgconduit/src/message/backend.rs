//! Decoding of backend (server->client) messages from their raw `(format,
//! body)` frame, per spec.md §4.2/§6.

use bytes::{Buf, Bytes};
use pgconduit_core::io::get_cstr;

use crate::error::{err_protocol, Error};

use super::codec::{tag, RawMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Idle,
    InTransaction,
    InFailedTransaction,
}

impl TransactionStatus {
    fn from_byte(b: u8) -> Result<Self, Error> {
        Ok(match b {
            b'I' => TransactionStatus::Idle,
            b'T' => TransactionStatus::InTransaction,
            b'E' => TransactionStatus::InFailedTransaction,
            other => return Err(err_protocol!("unknown transaction status byte: {other}")),
        })
    }
}

#[derive(Debug)]
pub enum AuthenticationMessage {
    Ok,
    CleartextPassword,
    Md5Password { salt: [u8; 4] },
    Sasl { mechanisms: Vec<String> },
    SaslContinue { data: Bytes },
    SaslFinal { data: Bytes },
}

#[derive(Debug, Clone)]
pub struct FieldDescription {
    pub name: String,
    pub table_oid: u32,
    pub column_id: i16,
    pub type_oid: u32,
    pub type_len: i16,
    pub type_modifier: i32,
    pub format: i16,
}

#[derive(Debug)]
pub struct RowDescription {
    pub fields: Vec<FieldDescription>,
}

#[derive(Debug)]
pub struct DataRow {
    pub values: Vec<Option<Bytes>>,
}

#[derive(Debug)]
pub struct CommandComplete {
    pub tag: String,
}

impl CommandComplete {
    /// The row count trailing the command tag (`INSERT 0 N`, `SELECT N`,
    /// `COPY N`, ...), when the tag carries one.
    pub fn rows_affected(&self) -> u64 {
        self.tag
            .rsplit(' ')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct PgSeverity(pub String);

#[derive(Debug, Clone)]
pub struct DatabaseErrorInfo {
    pub severity: String,
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
}

#[derive(Debug)]
pub struct ParameterStatus {
    pub name: String,
    pub value: String,
}

#[derive(Debug)]
pub struct BackendKeyData {
    pub process_id: u32,
    pub secret_key: u32,
}

#[derive(Debug)]
pub struct ParameterDescription {
    pub oids: Vec<u32>,
}

#[derive(Debug)]
pub struct NotificationResponse {
    pub process_id: u32,
    pub channel: String,
    pub payload: String,
}

pub enum BackendMessage {
    Authentication(AuthenticationMessage),
    ParameterStatus(ParameterStatus),
    BackendKeyData(BackendKeyData),
    ReadyForQuery(TransactionStatus),
    RowDescription(RowDescription),
    DataRow(DataRow),
    CommandComplete(CommandComplete),
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    EmptyQueryResponse,
    ParameterDescription(ParameterDescription),
    PortalSuspended,
    ErrorResponse(DatabaseErrorInfo),
    NoticeResponse(DatabaseErrorInfo),
    NotificationResponse(NotificationResponse),
    CopyInResponse { binary: bool },
    CopyOutResponse { binary: bool },
    CopyData(Bytes),
    CopyDone,
}

pub fn decode(message: RawMessage) -> Result<BackendMessage, Error> {
    let RawMessage { format, mut contents } = message;

    Ok(match format.0 {
        tag::AUTHENTICATION => BackendMessage::Authentication(decode_authentication(&mut contents)?),
        tag::PARAMETER_STATUS => {
            let name = get_cstr(&mut contents).map_err(Error::Io)?;
            let value = get_cstr(&mut contents).map_err(Error::Io)?;
            BackendMessage::ParameterStatus(ParameterStatus { name, value })
        }
        tag::BACKEND_KEY_DATA => BackendMessage::BackendKeyData(BackendKeyData {
            process_id: contents.get_u32(),
            secret_key: contents.get_u32(),
        }),
        tag::READY_FOR_QUERY => {
            BackendMessage::ReadyForQuery(TransactionStatus::from_byte(contents.get_u8())?)
        }
        tag::ROW_DESCRIPTION => BackendMessage::RowDescription(decode_row_description(&mut contents)?),
        tag::DATA_ROW => BackendMessage::DataRow(decode_data_row(&mut contents)?),
        tag::COMMAND_COMPLETE => {
            let tag = get_cstr(&mut contents).map_err(Error::Io)?;
            BackendMessage::CommandComplete(CommandComplete { tag })
        }
        tag::PARSE_COMPLETE => BackendMessage::ParseComplete,
        tag::BIND_COMPLETE => BackendMessage::BindComplete,
        tag::CLOSE_COMPLETE => BackendMessage::CloseComplete,
        tag::NO_DATA => BackendMessage::NoData,
        tag::EMPTY_QUERY_RESPONSE => BackendMessage::EmptyQueryResponse,
        tag::PARAMETER_DESCRIPTION => {
            let n = contents.get_i16();
            let oids = (0..n).map(|_| contents.get_u32()).collect();
            BackendMessage::ParameterDescription(ParameterDescription { oids })
        }
        tag::PORTAL_SUSPENDED => BackendMessage::PortalSuspended,
        tag::ERROR_RESPONSE => BackendMessage::ErrorResponse(decode_error_fields(&mut contents)?),
        tag::NOTICE_RESPONSE => BackendMessage::NoticeResponse(decode_error_fields(&mut contents)?),
        tag::NOTIFICATION_RESPONSE => {
            let process_id = contents.get_u32();
            let channel = get_cstr(&mut contents).map_err(Error::Io)?;
            let payload = get_cstr(&mut contents).map_err(Error::Io)?;
            BackendMessage::NotificationResponse(NotificationResponse {
                process_id,
                channel,
                payload,
            })
        }
        tag::COPY_IN_RESPONSE => {
            let binary = contents.get_u8() != 0;
            BackendMessage::CopyInResponse { binary }
        }
        tag::COPY_OUT_RESPONSE => {
            let binary = contents.get_u8() != 0;
            BackendMessage::CopyOutResponse { binary }
        }
        tag::COPY_DATA => BackendMessage::CopyData(contents),
        tag::COPY_DONE => BackendMessage::CopyDone,
        other => return Err(err_protocol!("unexpected backend message tag: {:?}", other as char)),
    })
}

fn decode_authentication(buf: &mut Bytes) -> Result<AuthenticationMessage, Error> {
    Ok(match buf.get_i32() {
        0 => AuthenticationMessage::Ok,
        3 => AuthenticationMessage::CleartextPassword,
        5 => {
            let mut salt = [0u8; 4];
            buf.copy_to_slice(&mut salt);
            AuthenticationMessage::Md5Password { salt }
        }
        10 => {
            let mut mechanisms = Vec::new();
            loop {
                let m = get_cstr(buf).map_err(Error::Io)?;
                if m.is_empty() {
                    break;
                }
                mechanisms.push(m);
            }
            AuthenticationMessage::Sasl { mechanisms }
        }
        11 => AuthenticationMessage::SaslContinue { data: buf.clone() },
        12 => AuthenticationMessage::SaslFinal { data: buf.clone() },
        other => return Err(err_protocol!("unsupported authentication method: {other}")),
    })
}

fn decode_row_description(buf: &mut Bytes) -> Result<RowDescription, Error> {
    let n = buf.get_i16();
    let mut fields = Vec::with_capacity(n.max(0) as usize);
    for _ in 0..n {
        let name = get_cstr(buf).map_err(Error::Io)?;
        let table_oid = buf.get_u32();
        let column_id = buf.get_i16();
        let type_oid = buf.get_u32();
        let type_len = buf.get_i16();
        let type_modifier = buf.get_i32();
        let format = buf.get_i16();
        fields.push(FieldDescription {
            name,
            table_oid,
            column_id,
            type_oid,
            type_len,
            type_modifier,
            format,
        });
    }
    Ok(RowDescription { fields })
}

fn decode_data_row(buf: &mut Bytes) -> Result<DataRow, Error> {
    let n = buf.get_i16();
    let mut values = Vec::with_capacity(n.max(0) as usize);
    for _ in 0..n {
        let len = buf.get_i32();
        if len < 0 {
            values.push(None);
        } else {
            values.push(Some(buf.copy_to_bytes(len as usize)));
        }
    }
    Ok(DataRow { values })
}

fn decode_error_fields(buf: &mut Bytes) -> Result<DatabaseErrorInfo, Error> {
    let mut severity = String::new();
    let mut code = String::new();
    let mut message = String::new();
    let mut detail = None;

    loop {
        let field_type = buf.get_u8();
        if field_type == 0 {
            break;
        }
        let value = get_cstr(buf).map_err(Error::Io)?;
        match field_type {
            b'S' => severity = value,
            b'C' => code = value,
            b'M' => message = value,
            b'D' => detail = Some(value),
            _ => {}
        }
    }

    Ok(DatabaseErrorInfo {
        severity,
        code,
        message,
        detail,
    })
}
