use std::collections::HashMap;

use crate::model::EntryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
}

/// Write permission for the feed. With `required == false` writes are always allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthGate {
    required: bool,
    signed_in: bool,
}

impl AuthGate {
    pub fn new(required: bool) -> Self {
        Self {
            required,
            signed_in: false,
        }
    }

    pub fn apply(&mut self, event: AuthEvent) {
        self.signed_in = matches!(event, AuthEvent::SignedIn);
    }

    pub fn can_write(&self) -> bool {
        !self.required || self.signed_in
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    confirmed: String,
    buffer: String,
}

impl EditSession {
    fn new(confirmed: String) -> Self {
        Self {
            buffer: confirmed.clone(),
            confirmed,
        }
    }

    pub fn confirmed(&self) -> &str {
        &self.confirmed
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_dirty(&self) -> bool {
        self.buffer != self.confirmed
    }
}

/// Per-entry transient edit state, kept apart from the cached entries.
/// An entry is in Editing exactly while it has a session here.
#[derive(Debug, Clone, Default)]
pub struct EditSessions {
    sessions: HashMap<EntryId, EditSession>,
}

impl EditSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_editing(&self, id: EntryId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn get(&self, id: EntryId) -> Option<&EditSession> {
        self.sessions.get(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Viewing -> Editing. Returns false if a session is already open for `id`.
    pub fn begin(&mut self, id: EntryId, confirmed: &str) -> bool {
        if self.sessions.contains_key(&id) {
            return false;
        }
        self.sessions
            .insert(id, EditSession::new(confirmed.to_string()));
        true
    }

    pub fn set_buffer(&mut self, id: EntryId, text: &str) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        session.buffer.clear();
        session.buffer.push_str(text);
        true
    }

    pub fn finish(&mut self, id: EntryId) -> Option<EditSession> {
        self.sessions.remove(&id)
    }

    /// Closes every session, yielding each id with its confirmed value.
    pub fn abandon_all(&mut self) -> Vec<(EntryId, String)> {
        self.sessions
            .drain()
            .map(|(id, session)| (id, session.confirmed))
            .collect()
    }
}
