//! A transfer session holding client and/or server data.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::data::{LockType, SessionData, SessionRole, SignatureAlgorithm, State, SATP_VERSION};
use super::error::SessionError;

/// Construction options for [`SatpSession`].
#[derive(Debug, Clone, Default)]
pub struct SatpSessionOptions {
    /// Transfer context the session belongs to.
    pub context_id: String,
    /// Explicit session id; generated when `None`.
    pub session_id: Option<String>,
    /// Create server data.
    pub server: bool,
    /// Create client data.
    pub client: bool,
}

/// One transfer as seen by a gateway. A gateway that plays both roles (a
/// transfer between two of its own networks) holds both records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SatpSession {
    server_session_data: Option<SessionData>,
    client_session_data: Option<SessionData>,
}

impl SatpSession {
    /// Create a session with fresh data for each requested role.
    ///
    /// The generated id is `{uuid v4}-{context_id}`.
    pub fn new(options: SatpSessionOptions) -> Result<Self, SessionError> {
        if !options.server && !options.client {
            return Err(SessionError::InvalidGatewayType {
                reason: "session must be created for a server, a client or both".to_string(),
            });
        }
        let id = options
            .session_id
            .unwrap_or_else(|| format!("{}-{}", Uuid::new_v4(), options.context_id));

        let make = |role| SessionData::new(id.clone(), options.context_id.clone(), role);
        let session = Self {
            server_session_data: options.server.then(|| make(SessionRole::Server)),
            client_session_data: options.client.then(|| make(SessionRole::Client)),
        };
        tracing::debug!(session_id = %id, "session created");
        Ok(session)
    }

    /// Rebuild a session from stored data; the data's role picks the slot.
    pub fn recreate_session(data: SessionData) -> Result<Self, SessionError> {
        let mut session = Self {
            server_session_data: None,
            client_session_data: None,
        };
        session.restore_session_data(data)?;
        Ok(session)
    }

    /// Put stored data into the slot of its role, replacing what was there.
    pub fn restore_session_data(&mut self, data: SessionData) -> Result<(), SessionError> {
        match data.role {
            SessionRole::Server => self.server_session_data = Some(data),
            SessionRole::Client => self.client_session_data = Some(data),
            SessionRole::Unspecified => {
                return Err(SessionError::InvalidGatewayType {
                    reason: format!("cannot restore session {} without a role", data.id),
                })
            }
        }
        Ok(())
    }

    /// Add fresh data for `role`; fails if that role already has data.
    pub fn create_session_data(
        &mut self,
        role: SessionRole,
        session_id: impl Into<String>,
        context_id: impl Into<String>,
    ) -> Result<&mut SessionData, SessionError> {
        let slot = match role {
            SessionRole::Server => &mut self.server_session_data,
            SessionRole::Client => &mut self.client_session_data,
            SessionRole::Unspecified => {
                return Err(SessionError::InvalidGatewayType {
                    reason: "session data needs a client or server role".to_string(),
                })
            }
        };
        if slot.is_some() {
            return Err(SessionError::SessionDataAlreadyDefined { role });
        }
        Ok(slot.insert(SessionData::new(session_id, context_id, role)))
    }

    /// Server data.
    pub fn server_session_data(&self) -> Result<&SessionData, SessionError> {
        self.server_session_data
            .as_ref()
            .ok_or(SessionError::SessionDataUndefined { role: SessionRole::Server })
    }

    /// Client data.
    pub fn client_session_data(&self) -> Result<&SessionData, SessionError> {
        self.client_session_data
            .as_ref()
            .ok_or(SessionError::SessionDataUndefined { role: SessionRole::Client })
    }

    /// Mutable data for `role`.
    pub fn session_data_mut(&mut self, role: SessionRole) -> Result<&mut SessionData, SessionError> {
        let slot = match role {
            SessionRole::Server => self.server_session_data.as_mut(),
            SessionRole::Client => self.client_session_data.as_mut(),
            SessionRole::Unspecified => None,
        };
        slot.ok_or(SessionError::SessionDataUndefined { role })
    }

    /// Data for `role`.
    pub fn session_data(&self, role: SessionRole) -> Result<&SessionData, SessionError> {
        match role {
            SessionRole::Server => self.server_session_data(),
            SessionRole::Client => self.client_session_data(),
            SessionRole::Unspecified => Err(SessionError::SessionDataUndefined { role }),
        }
    }

    /// Every record the session holds, server first.
    pub fn all_session_data(&self) -> impl Iterator<Item = &SessionData> {
        self.server_session_data
            .iter()
            .chain(self.client_session_data.iter())
    }

    /// Whether server data exists.
    pub fn has_server_session_data(&self) -> bool {
        self.server_session_data.is_some()
    }

    /// Whether client data exists.
    pub fn has_client_session_data(&self) -> bool {
        self.client_session_data.is_some()
    }

    /// Session id (server's first), or empty.
    pub fn session_id(&self) -> &str {
        self.all_session_data().next().map_or("", |d| d.id.as_str())
    }

    /// Session state (server's first), or `UNSPECIFIED`.
    pub fn session_state(&self) -> State {
        self.all_session_data()
            .next()
            .map_or(State::Unspecified, |d| d.state)
    }

    /// Check that the data for `role` is complete enough to continue.
    ///
    /// Stage 0 messages are exchanged before the network ids are agreed,
    /// so `stage0` skips those two fields. Any failure comes back wrapped in
    /// `SessionDataNotLoaded`.
    pub fn verify(
        &self,
        tag: &str,
        role: SessionRole,
        allow_rejected: bool,
        allow_completed: bool,
        stage0: bool,
    ) -> Result<(), SessionError> {
        self.session_data(role)
            .and_then(|data| verify_data(tag, data, allow_rejected, allow_completed, stage0))
            .map_err(|source| {
                tracing::debug!(tag, role = %role, error = %source, "session verification failed");
                SessionError::SessionDataNotLoaded {
                    tag: tag.to_string(),
                    source: Box::new(source),
                }
            })
    }
}

fn verify_data(
    tag: &str,
    data: &SessionData,
    allow_rejected: bool,
    allow_completed: bool,
    stage0: bool,
) -> Result<(), SessionError> {
    if data.state == State::Rejected && !allow_rejected {
        return Err(SessionError::SessionCompleted {
            reason: "session was rejected".to_string(),
        });
    }
    if data.state == State::Completed && !allow_completed {
        return Err(SessionError::SessionCompleted {
            reason: "session already completed".to_string(),
        });
    }

    let mut required: Vec<(&str, &str)> = vec![
        ("id", data.id.as_str()),
        ("digitalAssetId", data.digital_asset_id.as_str()),
    ];
    if !stage0 {
        required.push(("senderGatewayNetworkId", data.sender_gateway_network_id.as_str()));
        required.push(("recipientGatewayNetworkId", data.recipient_gateway_network_id.as_str()));
    }
    required.extend([
        ("clientGatewayPubkey", data.client_gateway_pubkey.as_str()),
        ("serverGatewayPubkey", data.server_gateway_pubkey.as_str()),
        ("senderGatewayOwnerId", data.sender_gateway_owner_id.as_str()),
        ("receiverGatewayOwnerId", data.receiver_gateway_owner_id.as_str()),
    ]);
    if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
        return Err(SessionError::missing(tag, field));
    }

    if data.signature_algorithm == SignatureAlgorithm::Unspecified {
        return Err(SessionError::missing(tag, "signatureAlgorithm"));
    }
    if data.lock_type == LockType::Unspecified {
        return Err(SessionError::missing(tag, "lockType"));
    }
    if data.lock_expiration_time == 0 {
        return Err(SessionError::missing(tag, "lockExpirationTime"));
    }
    if data.transfer_context_id.is_empty() {
        return Err(SessionError::missing(tag, "transferContextId"));
    }
    if data.version != SATP_VERSION {
        return Err(SessionError::VersionMismatch {
            tag: tag.to_string(),
            found: data.version.clone(),
            expected: SATP_VERSION.to_string(),
        });
    }
    Ok(())
}
