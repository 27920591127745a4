//! Memoria de conversación en proceso, una por sesión.
//!
//! Cada memoria es sólo de anexado y se pierde al reiniciar. El acceso a la
//! memoria de una sesión se serializa con un mutex asíncrono que el pipeline
//! mantiene durante carga → respuesta → guardado, así dos peticiones de la
//! misma sesión nunca intercalan sus turnos.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::models::ConversationTurn;

pub const DEFAULT_SESSION: &str = "default";

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    turns: Vec<ConversationTurn>,
    human_prefix: String,
    ai_prefix: String,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::with_prefixes("Human", "AI")
    }
}

impl ConversationMemory {
    pub fn with_prefixes(human_prefix: &str, ai_prefix: &str) -> Self {
        Self {
            turns: Vec::new(),
            human_prefix: human_prefix.to_string(),
            ai_prefix: ai_prefix.to_string(),
        }
    }

    /// Historial renderizado en orden cronológico; cadena vacía si no hay turnos.
    pub fn load(&self) -> String {
        self.turns
            .iter()
            .map(|turn| {
                format!(
                    "{}: {}\n{}: {}\n",
                    self.human_prefix, turn.question, self.ai_prefix, turn.answer
                )
            })
            .collect()
    }

    pub fn save(&mut self, question: &str, answer: &str) {
        self.turns.push(ConversationTurn {
            question: question.to_string(),
            answer: answer.to_string(),
            asked_at: Utc::now(),
        });
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

pub type SessionMemory = Arc<AsyncMutex<ConversationMemory>>;

/// Sesiones conservadas como máximo si no se configura otro límite.
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

struct SessionEntry {
    memory: SessionMemory,
    last_used: u64,
}

impl SessionEntry {
    /// Nadie más tiene la memoria en uso.
    fn is_idle(&self) -> bool {
        Arc::strong_count(&self.memory) == 1
    }
}

#[derive(Default)]
struct Sessions {
    entries: HashMap<String, SessionEntry>,
    clock: u64,
}

/// Memorias por identificador de sesión, con un número máximo de sesiones.
///
/// Al llegar al límite se expulsa la sesión inactiva usada hace más tiempo.
/// Las sesiones con una petición en curso nunca se expulsan, así que el mapa
/// sólo supera el límite mientras haya más peticiones simultáneas que huecos.
pub struct ConversationStore {
    sessions: Mutex<Sessions>,
    max_sessions: usize,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::with_max_sessions(DEFAULT_MAX_SESSIONS)
    }
}

impl ConversationStore {
    pub fn with_max_sessions(max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::default(),
            max_sessions: max_sessions.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Sessions> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Memoria de la sesión, creándola si es la primera vez que se ve.
    pub fn session(&self, session_id: &str) -> SessionMemory {
        let mut sessions = self.lock();
        sessions.clock += 1;
        let now = sessions.clock;

        if let Some(entry) = sessions.entries.get_mut(session_id) {
            entry.last_used = now;
            return Arc::clone(&entry.memory);
        }

        if sessions.entries.len() >= self.max_sessions {
            let oldest_idle = sessions
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_idle())
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest_idle {
                sessions.entries.remove(&id);
                debug!(session = %id, "Sesión inactiva expulsada de la memoria");
            }
        }

        let memory = SessionMemory::default();
        sessions.entries.insert(
            session_id.to_string(),
            SessionEntry {
                memory: Arc::clone(&memory),
                last_used: now,
            },
        );
        memory
    }

    /// Elimina la sesión si no tiene turnos y nadie la está usando.
    pub fn discard_if_empty(&self, session_id: &str) {
        let mut sessions = self.lock();
        let discard = sessions.entries.get(session_id).is_some_and(|entry| {
            entry.is_idle()
                && entry
                    .memory
                    .try_lock()
                    .is_ok_and(|memory| memory.is_empty())
        });
        if discard {
            sessions.entries.remove(session_id);
        }
    }

    pub fn session_count(&self) -> usize {
        self.lock().entries.len()
    }
}
