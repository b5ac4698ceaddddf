//! SFTP adapter.
//!
//! Lists remote directories over an authenticated ssh2 session. Every call
//! takes an absolute path, so there is no remote working-directory cursor to
//! keep consistent between walks. Files carry the `"N/A"` identity tag; the
//! protocol exposes no checksum.

use crate::error::{Result, TransportError};
use crate::{RawEntry, Transport};
use async_trait::async_trait;
use ssh2::{Session, Sftp};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Mutex;

/// Identity tag reported for SFTP files.
pub const SFTP_ETAG: &str = "N/A";

/// SFTP adapter configuration. Credentials arrive already resolved.
#[derive(Debug, Clone)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Password auth when set, ssh-agent otherwise.
    pub password: Option<String>,
}

/// SFTP transport over an authenticated ssh2 session.
pub struct SftpTransport {
    // The Sftp handle keeps the underlying session alive; the mutex
    // serializes access to the shared libssh2 handle.
    sftp: Mutex<Sftp>,
}

impl SftpTransport {
    /// Connect and authenticate.
    pub fn connect(config: &SftpConfig) -> Result<Self> {
        let tcp = TcpStream::connect((config.host.as_str(), config.port)).map_err(|source| {
            TransportError::Connect {
                host: config.host.clone(),
                port: config.port,
                source,
            }
        })?;

        let mut session = Session::new().map_err(|source| TransportError::Sftp {
            path: config.host.clone(),
            source,
        })?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|source| TransportError::Sftp {
            path: config.host.clone(),
            source,
        })?;

        match &config.password {
            Some(password) => session
                .userauth_password(&config.username, password)
                .map_err(|e| auth_error(config, e))?,
            None => session
                .userauth_agent(&config.username)
                .map_err(|e| auth_error(config, e))?,
        }

        if !session.authenticated() {
            return Err(TransportError::Auth {
                user: config.username.clone(),
                host: config.host.clone(),
                message: "no authentication method succeeded".to_string(),
            });
        }

        let sftp = session.sftp().map_err(|source| TransportError::Sftp {
            path: config.host.clone(),
            source,
        })?;

        Ok(Self {
            sftp: Mutex::new(sftp),
        })
    }
}

#[async_trait]
impl Transport for SftpTransport {
    async fn list_children(&self, location: &str) -> Result<Vec<RawEntry>> {
        // ssh2 is synchronous; a discovery run is a single bounded walk.
        let sftp = self.sftp.lock().unwrap_or_else(|p| p.into_inner());

        let items = sftp
            .readdir(Path::new(location))
            .map_err(|source| TransportError::Sftp {
                path: location.to_string(),
                source,
            })?;

        let mut entries = Vec::with_capacity(items.len());
        for (path, stat) in items {
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) if name != "." && name != ".." => name.to_string(),
                _ => continue,
            };

            let is_dir = stat.is_dir();
            entries.push(RawEntry {
                key: join_remote(location, &name),
                etag: (!is_dir).then(|| SFTP_ETAG.to_string()),
                last_modified: if is_dir {
                    None
                } else {
                    stat.mtime.map(|m| m as i64)
                },
                size: if is_dir { None } else { stat.size.map(|s| s as i64) },
                name,
                is_dir,
            });
        }

        Ok(entries)
    }
}

fn join_remote(location: &str, name: &str) -> String {
    format!("{}/{}", location.trim_end_matches('/'), name)
}

fn auth_error(config: &SftpConfig, source: ssh2::Error) -> TransportError {
    TransportError::Auth {
        user: config.username.clone(),
        host: config.host.clone(),
        message: source.to_string(),
    }
}
