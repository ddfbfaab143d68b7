//! SCRAM-SHA-256 client half (RFC 5802/7677), with optional
//! `tls-server-end-point` channel binding (RFC 5929) per spec.md §4.2.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::Error;

type HmacSha256 = Hmac<Sha256>;

pub struct ScramClient {
    username_norm: String,
    client_nonce: String,
    channel_binding: ChannelBinding,
    client_first_bare: String,
    server_signature: Option<Vec<u8>>,
}

enum ChannelBinding {
    None,
    TlsServerEndPoint(Vec<u8>),
}

impl ScramClient {
    pub fn new(channel_binding_data: Option<Vec<u8>>, use_plus: bool) -> Self {
        let client_nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();

        let channel_binding = match (use_plus, channel_binding_data) {
            (true, Some(data)) => ChannelBinding::TlsServerEndPoint(data),
            _ => ChannelBinding::None,
        };

        ScramClient {
            username_norm: "*".to_owned(), // the server already knows the username via startup
            client_nonce,
            channel_binding,
            client_first_bare: String::new(),
            server_signature: None,
        }
    }

    pub fn mechanism(&self) -> &'static str {
        match self.channel_binding {
            ChannelBinding::None => "SCRAM-SHA-256",
            ChannelBinding::TlsServerEndPoint(_) => "SCRAM-SHA-256-PLUS",
        }
    }

    fn gs2_header(&self) -> String {
        match &self.channel_binding {
            ChannelBinding::None => "n,,".to_owned(),
            ChannelBinding::TlsServerEndPoint(_) => "p=tls-server-end-point,,".to_owned(),
        }
    }

    pub fn client_first_message(&mut self) -> Vec<u8> {
        self.client_first_bare = format!("n={},r={}", self.username_norm, self.client_nonce);
        let message = format!("{}{}", self.gs2_header(), self.client_first_bare);
        message.into_bytes()
    }

    pub fn handle_server_first(
        &mut self,
        password: &str,
        server_first: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let server_first = std::str::from_utf8(server_first)
            .map_err(|e| Error::Authentication(format!("invalid SCRAM server-first: {e}")))?;

        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for part in server_first.split(',') {
            if let Some(v) = part.strip_prefix("r=") {
                nonce = Some(v.to_owned());
            } else if let Some(v) = part.strip_prefix("s=") {
                salt = Some(BASE64.decode(v).map_err(|e| {
                    Error::Authentication(format!("invalid SCRAM salt: {e}"))
                })?);
            } else if let Some(v) = part.strip_prefix("i=") {
                iterations = Some(v.parse::<u32>().map_err(|e| {
                    Error::Authentication(format!("invalid SCRAM iteration count: {e}"))
                })?);
            }
        }

        let server_nonce = nonce.ok_or_else(|| Error::Authentication("missing SCRAM nonce".into()))?;
        let salt = salt.ok_or_else(|| Error::Authentication("missing SCRAM salt".into()))?;
        let iterations =
            iterations.ok_or_else(|| Error::Authentication("missing SCRAM iteration count".into()))?;

        if !server_nonce.starts_with(&self.client_nonce) {
            return Err(Error::Authentication("SCRAM server nonce mismatch".into()));
        }

        let normalized_password = stringprep::saslprep(password)
            .map_err(|_| Error::Authentication("password contains invalid characters".into()))?;

        let salted_password = hi(normalized_password.as_bytes(), &salt, iterations);

        let client_key = hmac_sha256(&salted_password, b"Client Key");
        let stored_key = Sha256::digest(client_key);

        let channel_binding_b64 = match &self.channel_binding {
            ChannelBinding::None => BASE64.encode(self.gs2_header().as_bytes()),
            ChannelBinding::TlsServerEndPoint(data) => {
                let mut gs2_and_cbind = self.gs2_header().into_bytes();
                gs2_and_cbind.extend_from_slice(data);
                BASE64.encode(gs2_and_cbind)
            }
        };

        let client_final_without_proof = format!("c={channel_binding_b64},r={server_nonce}");
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare, server_first, client_final_without_proof
        );

        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes());
        let client_proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(a, b)| a ^ b)
            .collect();

        let server_key = hmac_sha256(&salted_password, b"Server Key");
        self.server_signature = Some(hmac_sha256(&server_key, auth_message.as_bytes()));

        let client_final = format!(
            "{},p={}",
            client_final_without_proof,
            BASE64.encode(client_proof)
        );

        Ok(client_final.into_bytes())
    }

    pub fn verify_server_final(&self, server_final: &[u8]) -> Result<(), Error> {
        let server_final = std::str::from_utf8(server_final)
            .map_err(|e| Error::Authentication(format!("invalid SCRAM server-final: {e}")))?;

        let signature = server_final
            .strip_prefix("v=")
            .ok_or_else(|| Error::Authentication("missing SCRAM server signature".into()))?;
        let signature = BASE64
            .decode(signature)
            .map_err(|e| Error::Authentication(format!("invalid SCRAM server signature: {e}")))?;

        if Some(signature) != self.server_signature {
            return Err(Error::Authentication(
                "SCRAM server signature mismatch; possible MITM".into(),
            ));
        }
        Ok(())
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// PBKDF2-HMAC-SHA256, RFC 7677 `Hi()`.
fn hi(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut salted = salt.to_vec();
    salted.extend_from_slice(&1u32.to_be_bytes());

    let mut u = hmac_sha256(password, &salted);
    let mut result = u.clone();

    for _ in 1..iterations {
        u = hmac_sha256(password, &u);
        for (r, u_byte) in result.iter_mut().zip(u.iter()) {
            *r ^= u_byte;
        }
    }

    result
}

/// MD5 auth, `md5(md5(password + user) + salt)` prefixed with `md5`.
pub fn md5_password(user: &str, password: &str, salt: [u8; 4]) -> String {
    let inner = md5_hex(format!("{password}{user}").as_bytes());
    let mut outer_input = inner.into_bytes();
    outer_input.extend_from_slice(&salt);
    format!("md5{}", md5_hex(&outer_input))
}

fn md5_hex(data: &[u8]) -> String {
    let digest = md5::Md5::digest(data);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

mod md5 {
    pub use md_5::{Digest, Md5};
}
