//! Ordered fallback over alternative backend endpoints.
//!
//! A chain is a list of named strategies evaluated in priority order. The
//! first `Hit` wins; `Miss` and `Fault` move on to the next entry, except a
//! fault caused by a rejected session, which ends the chain.

use serde::Serialize;
use tracing::debug;

use crate::api::ApiError;

#[derive(Debug)]
pub enum Outcome<T> {
    Hit(T),
    /// The endpoint is absent or not open to this role.
    Miss,
    Fault(ApiError),
}

impl<T> From<Result<T, ApiError>> for Outcome<T> {
    fn from(r: Result<T, ApiError>) -> Self {
        match r {
            Ok(v) => Outcome::Hit(v),
            Err(e) if e.is_miss() => Outcome::Miss,
            Err(e) => Outcome::Fault(e),
        }
    }
}

pub struct Strategy<'s, T> {
    pub name: &'static str,
    fetch: Box<dyn Fn() -> Outcome<T> + 's>,
}

impl<'s, T> Strategy<'s, T> {
    pub fn new(name: &'static str, fetch: impl Fn() -> Outcome<T> + 's) -> Self {
        Self {
            name,
            fetch: Box::new(fetch),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Hit,
    Miss,
    Fault,
}

#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub strategy: &'static str,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct Resolved<T> {
    pub value: Option<T>,
    pub attempts: Vec<Attempt>,
    pub unauthorized: bool,
}

impl<T> Resolved<T> {
    pub fn winner(&self) -> Option<&'static str> {
        self.attempts
            .iter()
            .find(|a| a.status == AttemptStatus::Hit)
            .map(|a| a.strategy)
    }

    /// Overall status: hit if any strategy hit, fault if any faulted, else miss.
    pub fn status(&self) -> AttemptStatus {
        if self.value.is_some() {
            AttemptStatus::Hit
        } else if self.attempts.iter().any(|a| a.status == AttemptStatus::Fault) {
            AttemptStatus::Fault
        } else {
            AttemptStatus::Miss
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.attempts.iter().rev().find_map(|a| a.error.as_deref())
    }
}

pub fn resolve_first<T>(chain: &str, strategies: Vec<Strategy<'_, T>>) -> Resolved<T> {
    let mut attempts = Vec::with_capacity(strategies.len());
    for s in strategies {
        match (s.fetch)() {
            Outcome::Hit(v) => {
                debug!(chain, strategy = s.name, "hit");
                attempts.push(Attempt {
                    strategy: s.name,
                    status: AttemptStatus::Hit,
                    error: None,
                });
                return Resolved {
                    value: Some(v),
                    attempts,
                    unauthorized: false,
                };
            }
            Outcome::Miss => {
                debug!(chain, strategy = s.name, "miss");
                attempts.push(Attempt {
                    strategy: s.name,
                    status: AttemptStatus::Miss,
                    error: None,
                });
            }
            Outcome::Fault(e) => {
                debug!(chain, strategy = s.name, error = %e, "fault");
                let unauthorized = e.is_unauthorized();
                attempts.push(Attempt {
                    strategy: s.name,
                    status: AttemptStatus::Fault,
                    error: Some(e.to_string()),
                });
                if unauthorized {
                    return Resolved {
                        value: None,
                        attempts,
                        unauthorized: true,
                    };
                }
            }
        }
    }
    Resolved {
        value: None,
        attempts,
        unauthorized: false,
    }
}
