//! Per-request routing decision between the monolith and the movies service.
//!
//! The decision is a pure function of the policy and a single draw in
//! `[0, 100)`. The draw is injected so tests can pin it; production passes a
//! uniform sample from the thread-local RNG. Nothing is sticky: every request
//! draws again.

use rand::Rng;

use crate::config::MigrationPolicy;

/// Where a request can be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Monolith,
    NewService,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Monolith => "monolith",
            Route::NewService => "movies-service",
        }
    }
}

/// Pick the route for one request.
///
/// With gradual migration off the draw is never taken and the monolith is
/// always chosen. Otherwise a draw strictly below `percent` goes to the new
/// service, so 0 never and 100 always selects it.
pub fn select_target(policy: &MigrationPolicy, draw: impl FnOnce() -> f64) -> Route {
    if !policy.gradual || policy.new_service.is_none() {
        return Route::Monolith;
    }
    if draw() < f64::from(policy.percent) {
        Route::NewService
    } else {
        Route::Monolith
    }
}

/// Uniform sample in `[0, 100)`.
pub fn uniform_draw<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(0.0..100.0)
}
