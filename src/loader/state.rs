//! Visible list state and the pure reducer that folds a settled request into it.
use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPhase {
    #[default]
    Idle,
    Loading,
    Success,
    Failed,
}

/// How a request ended, as seen by the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(Vec<T>),
    /// Message to surface to the user.
    Err(String),
    Cancelled,
}

impl<T> From<Result<Vec<T>, FetchError>> for Outcome<T> {
    fn from(result: Result<Vec<T>, FetchError>) -> Self {
        match result {
            Ok(items) => Outcome::Ok(items),
            Err(err) => match err.user_message() {
                Some(message) => Outcome::Err(message),
                None => Outcome::Cancelled,
            },
        }
    }
}

/// Copy of what a list view currently shows.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<Q, T> {
    pub phase: LoadPhase,
    /// Latest requested parameter tuple.
    pub query: Option<Q>,
    /// Last-good items; kept across failures.
    pub items: Vec<T>,
    pub error: Option<String>,
}

impl<Q, T> Default for Snapshot<Q, T> {
    fn default() -> Self {
        Self {
            phase: LoadPhase::Idle,
            query: None,
            items: Vec::new(),
            error: None,
        }
    }
}

impl<Q, T> Snapshot<Q, T> {
    pub fn is_loading(&self) -> bool {
        self.phase == LoadPhase::Loading
    }

    /// Enter `Loading` for `query`. Returns whether the loading flag flipped on.
    pub(crate) fn begin(&mut self, query: Q) -> bool {
        let was_loading = self.is_loading();
        self.phase = LoadPhase::Loading;
        self.query = Some(query);
        !was_loading
    }
}

/// Sink calls produced by [`reduce`], applied in field order.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit<T> {
    pub items: Option<Vec<T>>,
    pub loading: bool,
    pub notify: Option<String>,
}

/// Apply a settled request to the state.
///
/// Success replaces the items and clears the error. Failure keeps the
/// last-good items and yields one notification. Cancellation only clears
/// the loading flag.
pub fn reduce<Q, T: Clone>(state: &mut Snapshot<Q, T>, outcome: Outcome<T>) -> Commit<T> {
    match outcome {
        Outcome::Ok(items) => {
            state.phase = LoadPhase::Success;
            state.error = None;
            state.items = items.clone();
            Commit {
                items: Some(items),
                loading: false,
                notify: None,
            }
        }
        Outcome::Err(message) => {
            state.phase = LoadPhase::Failed;
            state.error = Some(message.clone());
            Commit {
                items: None,
                loading: false,
                notify: Some(message),
            }
        }
        Outcome::Cancelled => {
            state.phase = LoadPhase::Idle;
            Commit {
                items: None,
                loading: false,
                notify: None,
            }
        }
    }
}
