//! HTTP authentication challenges (Digest MD5, Basic)

use rand::Rng;
use std::collections::HashMap;

use crate::camera_registry::Credentials;

/// Parsed `WWW-Authenticate: Digest` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    /// `Some("auth")` when the server offers qop=auth, `None` for legacy digest
    pub qop: Option<String>,
}

/// Supported challenge schemes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChallenge {
    Digest(DigestChallenge),
    Basic,
}

/// Parse a `WWW-Authenticate` header value
///
/// Returns `None` for unknown schemes, non-MD5 digest algorithms and
/// challenges that only offer `auth-int`.
pub fn parse_challenge(header: &str) -> Option<AuthChallenge> {
    let header = header.trim();
    let (scheme, rest) = header
        .split_once(char::is_whitespace)
        .unwrap_or((header, ""));

    if scheme.eq_ignore_ascii_case("basic") {
        return Some(AuthChallenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("digest") {
        return None;
    }

    let params = parse_params(rest);

    if let Some(algorithm) = params.get("algorithm") {
        if !algorithm.eq_ignore_ascii_case("md5") {
            tracing::debug!(algorithm = %algorithm, "Unsupported digest algorithm");
            return None;
        }
    }

    let qop = match params.get("qop") {
        None => None,
        Some(offered) => {
            if offered.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")) {
                Some("auth".to_string())
            } else {
                return None;
            }
        }
    };

    Some(AuthChallenge::Digest(DigestChallenge {
        realm: params.get("realm")?.clone(),
        nonce: params.get("nonce")?.clone(),
        opaque: params.get("opaque").cloned(),
        qop,
    }))
}

/// Parse `key=value, key="quoted value"` auth parameters; keys are lowercased
pub(crate) fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if *c == ',' || c.is_whitespace()) {
            chars.next();
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.trim().is_empty() {
            break;
        }
        match chars.next() {
            Some('=') => {}
            Some(_) => continue,
            None => break,
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }

        params.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    params
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Random client nonce
pub fn new_cnonce() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl DigestChallenge {
    /// Digest `response` value
    pub fn response(
        &self,
        credentials: &Credentials,
        method: &str,
        uri: &str,
        cnonce: &str,
        nc: u32,
    ) -> String {
        let ha1 = md5_hex(&format!(
            "{}:{}:{}",
            credentials.username, self.realm, credentials.password
        ));
        let ha2 = md5_hex(&format!("{}:{}", method, uri));

        match &self.qop {
            Some(qop) => md5_hex(&format!(
                "{}:{}:{:08x}:{}:{}:{}",
                ha1, self.nonce, nc, cnonce, qop, ha2
            )),
            None => md5_hex(&format!("{}:{}:{}", ha1, self.nonce, ha2)),
        }
    }

    /// `Authorization` header value
    pub fn authorization(
        &self,
        credentials: &Credentials,
        method: &str,
        uri: &str,
        cnonce: &str,
        nc: u32,
    ) -> String {
        let response = self.response(credentials, method, uri, cnonce, nc);
        let mut header = format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}", algorithm=MD5"#,
            credentials.username, self.realm, self.nonce, uri, response
        );
        if let Some(qop) = &self.qop {
            header.push_str(&format!(r#", qop={}, nc={:08x}, cnonce="{}""#, qop, nc, cnonce));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(r#", opaque="{}""#, opaque));
        }
        header
    }
}
