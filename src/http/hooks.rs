//! Pre- and post-request hooks
//!
//! Hooks are user callbacks. A failing or panicking hook is logged and
//! skipped; it never fails the request it is attached to.

use super::request::{RawResponse, RequestSpec};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Outcome of a hook call
pub type HookResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Called before each attempt is sent. May mutate the request in place.
pub type PreRequestHook = Arc<dyn Fn(&mut RequestSpec) -> HookResult + Send + Sync>;

/// Called after a successful response with the parsed value (if any) and
/// the number of attempts it took.
pub type PostRequestHook =
    Arc<dyn Fn(&RawResponse, Option<&(dyn Any + Send + Sync)>, u32) -> HookResult + Send + Sync>;

pub(crate) fn run_pre_request_hooks(hooks: &[PreRequestHook], spec: &mut RequestSpec) {
    if hooks.is_empty() {
        return;
    }
    debug!(
        "Executing {} pre-request hooks for {} {}",
        hooks.len(),
        spec.method,
        spec.url
    );
    for (index, hook) in hooks.iter().enumerate() {
        match catch_unwind(AssertUnwindSafe(|| hook(spec))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Error executing pre-request hook #{index}: {e}"),
            Err(_) => error!("Pre-request hook #{index} panicked"),
        }
    }
}

pub(crate) fn run_post_request_hooks(
    hooks: &[PostRequestHook],
    response: &RawResponse,
    parsed: Option<&(dyn Any + Send + Sync)>,
    attempts: u32,
) {
    if hooks.is_empty() {
        return;
    }
    debug!(
        "Executing {} post-request hooks for {}",
        hooks.len(),
        response.url
    );
    for (index, hook) in hooks.iter().enumerate() {
        match catch_unwind(AssertUnwindSafe(|| hook(response, parsed, attempts))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Error executing post-request hook #{index}: {e}"),
            Err(_) => error!("Post-request hook #{index} panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use std::sync::atomic::{AtomicU32, Ordering};
    use url::Url;

    fn spec() -> RequestSpec {
        RequestSpec::new(Method::GET, Url::parse("https://api.example.com/x").unwrap())
    }

    #[test]
    fn test_failing_hooks_do_not_block_others() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let hooks: Vec<PreRequestHook> = vec![
            Arc::new(|_: &mut RequestSpec| -> HookResult { Err("boom".into()) }),
            Arc::new(|_: &mut RequestSpec| -> HookResult { panic!("hook exploded") }),
            Arc::new(move |spec: &mut RequestSpec| -> HookResult {
                counter.fetch_add(1, Ordering::SeqCst);
                spec.set_header("X-Hooked", "yes")?;
                Ok(())
            }),
        ];

        let mut spec = spec();
        run_pre_request_hooks(&hooks, &mut spec);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(spec.header("X-Hooked"), Some("yes"));
    }
}
