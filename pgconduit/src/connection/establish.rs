//! Startup and authentication: dials every configured host in turn, performs
//! the SSL negotiation dance, authenticates with whatever method the server
//! asks for, and enforces `target_session_attrs` before handing back a live
//! [`super::PgConnection`] (spec.md §3, §4.2).

use std::collections::HashMap;

use rand::seq::SliceRandom;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use pgconduit_core::net::Socket;

use crate::error::{err_protocol, Error};
use crate::message::backend::{AuthenticationMessage, BackendMessage};
use crate::message::frontend;
use crate::message::scram::{md5_password, ScramClient};
use crate::options::{ConnectConfig, LoadBalanceHosts, SslMode, TargetSessionAttrs};

use super::stmt_cache::StatementCache;
use super::stream::PgStream;
use super::type_cache::TypeCache;
use super::{ConnectionState, PgConnection};

pub(crate) async fn connect(config: &ConnectConfig) -> Result<PgConnection, Error> {
    let mut candidates: Vec<(String, u16)> = config
        .hosts
        .iter()
        .cloned()
        .zip(config.ports.iter().copied())
        .collect();

    if config.load_balance_hosts == LoadBalanceHosts::Random {
        candidates.shuffle(&mut rand::thread_rng());
    }

    let mut last_err = None;
    for (host, port) in candidates {
        match connect_one(&host, port, config).await {
            Ok(conn) => return Ok(conn),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Connection("no hosts configured".into())))
}

async fn connect_one(host: &str, port: u16, config: &ConnectConfig) -> Result<PgConnection, Error> {
    let socket = tokio::time::timeout(config.connect_timeout, Socket::connect_tcp(host, port))
        .await
        .map_err(|_| Error::Connection(format!("connect to {host}:{port} timed out")))?
        .map_err(Error::Io)?;

    if config.keepalive.enabled {
        socket
            .set_keepalive(config.keepalive.idle, config.keepalive.interval, config.keepalive.retries)
            .map_err(Error::Io)?;
    }

    let socket = negotiate_tls(socket, host, config).await?;
    let mut stream = PgStream::new(socket);

    send_startup(&mut stream, config).await?;

    let mut parameters = HashMap::new();
    let mut process_id = 0;
    let mut secret_key = 0;

    loop {
        match stream.recv().await? {
            BackendMessage::Authentication(auth) => {
                handle_authentication(&mut stream, auth, config).await?;
            }
            BackendMessage::ParameterStatus(p) => {
                parameters.insert(p.name, p.value);
            }
            BackendMessage::BackendKeyData(k) => {
                process_id = k.process_id;
                secret_key = k.secret_key;
            }
            BackendMessage::ErrorResponse(info) => {
                return Err(Error::Database {
                    code: info.code,
                    message: info.message,
                    detail: info.detail,
                    connection_discarded: true,
                });
            }
            BackendMessage::ReadyForQuery(_) => break,
            other => return Err(err_protocol!("unexpected message during startup: {other:?}")),
        }
    }

    if let Some(sync_commit) = config.synchronous_commit {
        run_simple(&mut stream, &format!("SET synchronous_commit = '{}'", sync_commit.as_sql())).await?;
    }

    enforce_target_session_attrs(&mut stream, config.target_session_attrs).await?;

    Ok(PgConnection {
        stream,
        state: ConnectionState::Idle,
        process_id,
        secret_key,
        parameters,
        statements: StatementCache::new(),
        type_cache: TypeCache::new(),
        host: host.to_owned(),
        port,
        generation: 0,
    })
}

async fn negotiate_tls(socket: Socket, host: &str, config: &ConnectConfig) -> Result<Socket, Error> {
    if !config.ssl_mode.requires_tls() {
        return Ok(socket);
    }

    let mut socket = socket;
    let mut buf = Vec::new();
    frontend::write_ssl_request(&mut buf);
    socket.write_all(&buf).await.map_err(Error::Io)?;
    socket.flush().await.map_err(Error::Io)?;

    let response = socket.read_u8().await.map_err(Error::Io)?;
    match response {
        b'S' => {
            let tls_config = pgconduit_core::net::build_tls_config(
                config.ssl_root_cert.as_deref(),
                config.ssl_mode.verify_hostname(),
            )
            .map_err(Error::Tls)?;
            socket.upgrade_tls(host, tls_config).await.map_err(Error::Tls)
        }
        b'N' => {
            if matches!(config.ssl_mode, SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull) {
                Err(Error::Connection(
                    "server does not support TLS but sslmode requires it".into(),
                ))
            } else {
                Ok(socket)
            }
        }
        other => Err(err_protocol!("unexpected SSLRequest response byte: {other}")),
    }
}

async fn send_startup(stream: &mut PgStream, config: &ConnectConfig) -> Result<(), Error> {
    frontend::write_startup(
        stream.buffer(),
        &config.user,
        &config.database,
        config.application_name.as_deref(),
        config.options.as_deref(),
    );
    stream.flush().await
}

async fn handle_authentication(
    stream: &mut PgStream,
    auth: AuthenticationMessage,
    config: &ConnectConfig,
) -> Result<(), Error> {
    match auth {
        AuthenticationMessage::Ok => Ok(()),
        AuthenticationMessage::CleartextPassword => {
            let password = require_password(config)?;
            frontend::write_password(stream.buffer(), password);
            stream.flush().await
        }
        AuthenticationMessage::Md5Password { salt } => {
            let password = require_password(config)?;
            let hashed = md5_password(&config.user, password, salt);
            frontend::write_password(stream.buffer(), &hashed);
            stream.flush().await
        }
        AuthenticationMessage::Sasl { mechanisms } => {
            run_scram(stream, &mechanisms, config).await
        }
        AuthenticationMessage::SaslContinue { .. } | AuthenticationMessage::SaslFinal { .. } => {
            Err(err_protocol!("SASL message received outside of an active exchange"))
        }
    }
}

fn require_password(config: &ConnectConfig) -> Result<&str, Error> {
    config
        .password
        .as_deref()
        .ok_or_else(|| Error::Authentication("server requested a password but none was configured".into()))
}

async fn run_scram(stream: &mut PgStream, mechanisms: &[String], config: &ConnectConfig) -> Result<(), Error> {
    let password = require_password(config)?;

    let use_plus = mechanisms.iter().any(|m| m == "SCRAM-SHA-256-PLUS")
        && stream.socket_mut().is_tls();
    let channel_binding_data = stream.socket_mut().tls_server_end_point();

    let mut scram = ScramClient::new(channel_binding_data, use_plus);
    let mechanism = scram.mechanism();
    if !mechanisms.iter().any(|m| m == mechanism) {
        return Err(Error::Authentication(format!(
            "server does not support {mechanism}"
        )));
    }

    let client_first = scram.client_first_message();
    frontend::write_sasl_initial_response(stream.buffer(), mechanism, &client_first);
    stream.flush().await?;

    let server_first = match stream.recv().await? {
        BackendMessage::Authentication(AuthenticationMessage::SaslContinue { data }) => data,
        BackendMessage::ErrorResponse(info) => return Err(database_error(info, true)),
        other => return Err(err_protocol!("expected SASLContinue, got {other:?}")),
    };

    let client_final = scram.handle_server_first(password, &server_first)?;
    frontend::write_sasl_response(stream.buffer(), &client_final);
    stream.flush().await?;

    let server_final = match stream.recv().await? {
        BackendMessage::Authentication(AuthenticationMessage::SaslFinal { data }) => data,
        BackendMessage::ErrorResponse(info) => return Err(database_error(info, true)),
        other => return Err(err_protocol!("expected SASLFinal, got {other:?}")),
    };
    scram.verify_server_final(&server_final)?;

    match stream.recv().await? {
        BackendMessage::Authentication(AuthenticationMessage::Ok) => Ok(()),
        BackendMessage::ErrorResponse(info) => Err(database_error(info, true)),
        other => Err(err_protocol!("expected AuthenticationOk, got {other:?}")),
    }
}

fn database_error(info: crate::message::DatabaseErrorInfo, discarded: bool) -> Error {
    Error::Database {
        code: info.code,
        message: info.message,
        detail: info.detail,
        connection_discarded: discarded,
    }
}

async fn enforce_target_session_attrs(
    stream: &mut PgStream,
    attrs: TargetSessionAttrs,
) -> Result<(), Error> {
    if attrs == TargetSessionAttrs::Any {
        return Ok(());
    }

    let read_only = run_simple_scalar(stream, "SHOW transaction_read_only").await?;
    let is_read_only = read_only.eq_ignore_ascii_case("on");

    match attrs {
        TargetSessionAttrs::ReadWrite if is_read_only => Err(Error::Connection(
            "server is in read-only mode but target_session_attrs=read-write was requested".into(),
        )),
        TargetSessionAttrs::ReadOnly if !is_read_only => Err(Error::Connection(
            "server is not read-only but target_session_attrs=read-only was requested".into(),
        )),
        _ => Ok(()),
    }
}

async fn run_simple(stream: &mut PgStream, sql: &str) -> Result<(), Error> {
    frontend::write_query(stream.buffer(), sql);
    stream.flush().await?;
    loop {
        match stream.recv().await? {
            BackendMessage::ReadyForQuery(_) => return Ok(()),
            BackendMessage::ErrorResponse(info) => return Err(database_error(info, false)),
            _ => {}
        }
    }
}

async fn run_simple_scalar(stream: &mut PgStream, sql: &str) -> Result<String, Error> {
    frontend::write_query(stream.buffer(), sql);
    stream.flush().await?;

    let mut value = None;
    loop {
        match stream.recv().await? {
            BackendMessage::DataRow(row) => {
                value = row
                    .values
                    .into_iter()
                    .next()
                    .flatten()
                    .map(|b| String::from_utf8_lossy(&b).into_owned());
            }
            BackendMessage::ReadyForQuery(_) => break,
            BackendMessage::ErrorResponse(info) => return Err(database_error(info, false)),
            _ => {}
        }
    }
    value.ok_or_else(|| err_protocol!("query `{sql}` returned no rows"))
}
