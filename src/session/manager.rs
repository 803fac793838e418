// ABOUTME: Session manager — owns the current session and orchestrates create/switch/remove/restore.
// ABOUTME: The outgoing session is always saved before the incoming one becomes current.

use crate::identity::Identity;
use crate::session::persistence::{SessionMetadata, StoreError};
use crate::session::{Session, SessionDeps, SessionError};

/// Result of `SessionManager::create_new_session`.
#[derive(Debug)]
pub struct NewSessionOutcome {
    pub session_id: String,
    pub attempted_save: bool,
    pub previous_id: Option<String>,
    pub save_error: Option<StoreError>,
}

/// Result of `SessionManager::switch_to_session`.
#[derive(Debug)]
pub struct SwitchOutcome {
    /// Id of the session that is current afterwards.
    pub session_id: String,
    pub attempted_save: bool,
    pub previous_id: Option<String>,
    pub save_error: Option<StoreError>,
    pub load_error: Option<SessionError>,
    /// Whether the loaded session came back with at least one exchange.
    pub had_history: bool,
}

impl SwitchOutcome {
    pub fn loaded(&self) -> bool {
        self.load_error.is_none()
    }
}

/// Result of `SessionManager::remove_current_and_create_new`.
#[derive(Debug)]
pub struct RemoveOutcome {
    pub session_id: String,
    pub removed_id: Option<String>,
    pub removed: bool,
    pub error: Option<StoreError>,
}

/// Owns the single current session of a running process.
pub struct SessionManager {
    deps: SessionDeps,
    identity: Identity,
    current: Option<Session>,
}

impl SessionManager {
    pub fn new(deps: SessionDeps, identity: Identity) -> Self {
        Self {
            deps,
            identity,
            current: None,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn deps(&self) -> &SessionDeps {
        &self.deps
    }

    /// The current session, created on first use.
    pub fn current(&mut self) -> Result<&mut Session, SessionError> {
        let session = match self.current.take() {
            Some(session) => session,
            None => self.fresh_session()?,
        };
        Ok(self.current.insert(session))
    }

    /// Id of the current session, if one has been installed.
    pub fn current_id(&self) -> Option<&str> {
        self.current.as_ref().map(Session::id)
    }

    /// Install the startup session.
    ///
    /// A requested id that cannot be restored falls back to a fresh session;
    /// the restore error is returned for display. Only a failure to create
    /// the fresh session is an error.
    pub fn initialize(
        &mut self,
        requested_id: Option<&str>,
    ) -> Result<Option<SessionError>, SessionError> {
        if let Some(id) = requested_id {
            match Session::restore(self.deps.clone(), self.identity.clone(), id) {
                Ok(session) => {
                    tracing::info!(session = id, messages = session.history().len(), "restored session");
                    self.current = Some(session);
                    return Ok(None);
                }
                Err(e) => {
                    tracing::warn!(session = id, error = %e, "could not restore session, starting fresh");
                    self.current = Some(self.fresh_session()?);
                    return Ok(Some(e));
                }
            }
        }
        self.current = Some(self.fresh_session()?);
        Ok(None)
    }

    /// Replace the current session with a new empty one.
    pub fn create_new_session(
        &mut self,
        save_current_first: bool,
    ) -> Result<NewSessionOutcome, SessionError> {
        let previous_id = self.current_id().map(str::to_string);
        let (attempted_save, save_error) = if save_current_first {
            self.save_current()
        } else {
            (false, None)
        };

        let session = self.fresh_session()?;
        let session_id = session.id().to_string();
        self.current = Some(session);

        Ok(NewSessionOutcome {
            session_id,
            attempted_save,
            previous_id,
            save_error,
        })
    }

    /// Save the current session, then make the stored session `id` current.
    ///
    /// When the load fails the previous session stays current.
    pub fn switch_to_session(&mut self, id: &str) -> SwitchOutcome {
        let previous_id = self.current_id().map(str::to_string);
        let (attempted_save, save_error) = self.save_current();

        match Session::restore(self.deps.clone(), self.identity.clone(), id) {
            Ok(session) => {
                let had_history = !session.is_empty();
                self.current = Some(session);
                SwitchOutcome {
                    session_id: id.to_string(),
                    attempted_save,
                    previous_id,
                    save_error,
                    load_error: None,
                    had_history,
                }
            }
            Err(e) => {
                tracing::warn!(session = id, error = %e, "switch failed, keeping current session");
                SwitchOutcome {
                    session_id: previous_id.clone().unwrap_or_default(),
                    attempted_save,
                    previous_id,
                    save_error,
                    load_error: Some(e),
                    had_history: false,
                }
            }
        }
    }

    /// Delete the current session's file and install a fresh session.
    ///
    /// The fresh session is installed even when deletion fails. If the fresh
    /// session cannot be created nothing is removed.
    pub fn remove_current_and_create_new(&mut self) -> Result<RemoveOutcome, SessionError> {
        let session = self.fresh_session()?;
        let session_id = session.id().to_string();

        let removed_id = self
            .current
            .replace(session)
            .map(|old| old.id().to_string());
        let error = match &removed_id {
            Some(id) => self.deps.store.remove(id).err(),
            None => None,
        };
        if let Some(e) = &error {
            tracing::warn!(error = %e, "session removal failed");
        }

        Ok(RemoveOutcome {
            session_id,
            removed: removed_id.is_some() && error.is_none(),
            removed_id,
            error,
        })
    }

    /// Final flush on exit. Empty sessions are left unsaved.
    pub fn cleanup_and_save(&mut self) -> Result<(), StoreError> {
        match &self.current {
            Some(session) if !session.is_empty() => {
                session.save()?;
                tracing::info!(session = session.id(), "session saved on exit");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionMetadata>, StoreError> {
        self.deps.store.list()
    }

    fn save_current(&self) -> (bool, Option<StoreError>) {
        match &self.current {
            Some(session) => (true, session.save().err()),
            None => (false, None),
        }
    }

    fn fresh_session(&self) -> Result<Session, SessionError> {
        Session::create(self.deps.clone(), self.identity.clone(), None, Vec::new())
    }
}
