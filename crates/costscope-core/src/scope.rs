//! Attribution scopes
//!
//! Every execution context owns its own [`ScopeStack`]:
//!
//! - plain threads use a thread-local stack,
//! - async tasks get a task-local stack through [`in_scope`] or
//!   [`inherit_scope`], so attribution follows the task across worker threads.
//!
//! [`enter`] pushes onto whichever stack is active and returns a
//! [`ScopeGuard`] that pops exactly that entry when dropped, whether the scope
//! ends normally, early, by panic, or because its future was cancelled.
//!
//! ```
//! use costscope_core::scope::{current_path, enter};
//!
//! let _pipeline = enter("pipeline");
//! {
//!     let _fetch = enter("fetch");
//!     assert_eq!(current_path().to_string(), "pipeline > fetch");
//! }
//! assert_eq!(current_path().to_string(), "pipeline");
//! ```

use crate::error::CoreError;
use crate::models::ScopePath;
use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use tracing::{debug, error};

/// Ordered stack of active scope names, innermost last
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeStack {
    frames: Vec<String>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack pre-populated with an inherited path
    pub fn from_path(path: &ScopePath) -> Self {
        Self {
            frames: path.segments().to_vec(),
        }
    }

    /// Push a frame, returning the depth it occupies (1-based)
    pub fn push(&mut self, name: impl Into<String>) -> usize {
        self.frames.push(name.into());
        self.frames.len()
    }

    /// Pop the frame pushed at `depth`, which must be the top of the stack
    pub fn pop(&mut self, expected: &str, depth: usize) -> Result<(), CoreError> {
        let top_matches = self.frames.len() == depth
            && self.frames.last().map(String::as_str) == Some(expected);
        if !top_matches {
            return Err(CoreError::UnbalancedScopeStack {
                expected: expected.to_string(),
                depth,
                found: self.describe_top(),
            });
        }
        self.frames.pop();
        Ok(())
    }

    /// Scoped entry borrowing this stack; nested entries reborrow the guard
    ///
    /// The borrow checker guarantees these guards are released in order.
    pub fn enter(&mut self, name: impl Into<String>) -> StackGuard<'_> {
        let depth = self.push(name);
        StackGuard { stack: self, depth }
    }

    pub fn snapshot(&self) -> ScopePath {
        ScopePath::from(self.frames.clone())
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn describe_top(&self) -> String {
        match self.frames.last() {
            Some(name) => format!("'{}' at depth {}", name, self.frames.len()),
            None => "an empty stack".to_string(),
        }
    }
}

/// Guard returned by [`ScopeStack::enter`]
pub struct StackGuard<'a> {
    stack: &'a mut ScopeStack,
    depth: usize,
}

impl StackGuard<'_> {
    /// Enter a nested scope
    pub fn enter(&mut self, name: impl Into<String>) -> StackGuard<'_> {
        self.stack.enter(name)
    }

    pub fn path(&self) -> ScopePath {
        self.stack.snapshot()
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        self.stack.frames.truncate(self.depth.saturating_sub(1));
    }
}

thread_local! {
    static THREAD_STACK: RefCell<ScopeStack> = RefCell::new(ScopeStack::new());
}

tokio::task_local! {
    static TASK_STACK: RefCell<ScopeStack>;
}

/// Which stack a guard belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextKind {
    Task,
    Thread,
}

fn active_context() -> ContextKind {
    if TASK_STACK.try_with(|_| ()).is_ok() {
        ContextKind::Task
    } else {
        ContextKind::Thread
    }
}

fn with_stack<R>(kind: ContextKind, f: impl FnOnce(&mut ScopeStack) -> R) -> Option<R> {
    match kind {
        ContextKind::Task => TASK_STACK.try_with(|cell| f(&mut cell.borrow_mut())).ok(),
        ContextKind::Thread => THREAD_STACK.try_with(|cell| f(&mut cell.borrow_mut())).ok(),
    }
}

/// One pushed frame; popping it is checked against name and depth
#[derive(Debug)]
struct Frame {
    name: String,
    depth: usize,
    kind: ContextKind,
    released: bool,
}

impl Frame {
    fn push(name: String, kind: ContextKind) -> Self {
        let depth = with_stack(kind, |stack| stack.push(name.clone())).unwrap_or(0);
        debug!(scope = %name, depth, "scope entered");
        Self {
            name,
            depth,
            kind,
            released: false,
        }
    }

    fn release(&self) -> Result<(), CoreError> {
        let outcome = with_stack(self.kind, |stack| stack.pop(&self.name, self.depth));
        match outcome {
            Some(result) => {
                if result.is_ok() {
                    debug!(scope = %self.name, depth = self.depth, "scope exited");
                }
                result
            }
            // Thread is shutting down: its stack is gone along with every frame.
            None if self.kind == ContextKind::Thread => Ok(()),
            None => Err(CoreError::UnbalancedScopeStack {
                expected: self.name.clone(),
                depth: self.depth,
                found: "no task stack (guard left its task)".to_string(),
            }),
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.release() {
            error!(scope = %self.name, depth = self.depth, error = %e, "scope stack imbalance");
            if !std::thread::panicking() {
                panic!("{}", e);
            }
        }
    }
}

/// Handle for one entered scope; dropping it exits the scope
///
/// The guard is `!Send`. Outside [`in_scope`]/[`inherit_scope`] it points at
/// the thread's stack, which every task on a runtime worker shares, so it must
/// not be held across an `.await` in a spawned task:
///
/// ```compile_fail
/// use costscope_core::scope;
///
/// fn spawn_holding_guard() {
///     tokio::spawn(async {
///         let _guard = scope::enter("held");
///         tokio::task::yield_now().await;
///     });
/// }
/// ```
///
/// Async code uses [`in_scope`] instead:
///
/// ```
/// use costscope_core::scope;
///
/// fn spawn_in_scope() {
///     tokio::spawn(scope::in_scope("held", async {
///         tokio::task::yield_now().await;
///     }));
/// }
/// ```
#[must_use = "the scope ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ScopeGuard {
    frame: Frame,
    _not_send: PhantomData<*const ()>,
}

impl ScopeGuard {
    pub fn name(&self) -> &str {
        &self.frame.name
    }

    /// Depth of this scope within its stack (1-based)
    pub fn depth(&self) -> usize {
        self.frame.depth
    }

    /// Exit the scope explicitly
    ///
    /// An out-of-order exit leaves the stack untouched and hands the guard
    /// back, still owning its frame, so it can be closed again once the
    /// inner scopes are gone.
    pub fn close(mut self) -> Result<(), CloseError> {
        match self.frame.release() {
            Ok(()) => {
                self.frame.released = true;
                Ok(())
            }
            Err(error) => Err(CloseError { guard: self, error }),
        }
    }
}

/// Failed [`ScopeGuard::close`]
#[derive(Debug)]
pub struct CloseError {
    /// The guard, still holding its frame
    pub guard: ScopeGuard,
    pub error: CoreError,
}

impl std::fmt::Display for CloseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for CloseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Frame on a task-local stack, held by [`in_scope`] across awaits
struct TaskScopeGuard {
    _frame: Frame,
}

/// Enter a scope on the current execution context's stack
///
/// On a runtime thread with no task-local stack this falls back to the
/// thread's stack and logs an error: sibling tasks on that worker would see
/// the frame.
pub fn enter(name: impl Into<String>) -> ScopeGuard {
    let name = name.into();
    let kind = active_context();
    if kind == ContextKind::Thread && tokio::runtime::Handle::try_current().is_ok() {
        error!(
            scope = %name,
            "scope entered on a runtime thread without a task stack; wrap the task in in_scope or inherit_scope"
        );
    }
    ScopeGuard {
        frame: Frame::push(name, kind),
        _not_send: PhantomData,
    }
}

/// Snapshot of the current execution context's path
pub fn current_path() -> ScopePath {
    with_stack(active_context(), |stack| stack.snapshot()).unwrap_or_default()
}

/// Depth of the current execution context's stack
pub fn current_depth() -> usize {
    with_stack(active_context(), |stack| stack.depth()).unwrap_or(0)
}

/// Run `f` inside a named scope
pub fn profile<R>(name: impl Into<String>, f: impl FnOnce() -> R) -> R {
    let _guard = enter(name);
    f()
}

/// Run a future inside a named scope
///
/// The future gets its own task-local stack seeded from the caller's current
/// path. It keeps its attribution when it migrates between threads, and
/// sibling futures polled by the same task (`join!`, `select!`) never share
/// frames.
pub async fn in_scope<F: Future>(name: impl Into<String>, fut: F) -> F::Output {
    let name = name.into();
    let seed = RefCell::new(ScopeStack::from_path(&current_path()));
    TASK_STACK
        .scope(seed, async move {
            let _guard = TaskScopeGuard {
                _frame: Frame::push(name, ContextKind::Task),
            };
            fut.await
        })
        .await
}

/// Give a future its own stack, starting from a snapshot of the caller's path
///
/// Use this when spawning tasks so their calls stay attributed to the spawner.
pub fn inherit_scope<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    let seed = RefCell::new(ScopeStack::from_path(&current_path()));
    TASK_STACK.scope(seed, fut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn clear_thread_stack() {
        with_stack(ContextKind::Thread, |stack| stack.frames.clear());
    }

    #[test]
    fn test_nested_enter_builds_path() {
        let _a = enter("a");
        let _b = enter("b");
        assert_eq!(current_path(), ScopePath::new(["a", "b"]));
        assert_eq!(current_depth(), 2);
    }

    #[test]
    fn test_empty_stack_is_unattributed() {
        assert!(current_path().is_unattributed());
    }

    #[test]
    fn test_early_return_pops() {
        fn work(bail: bool) -> u32 {
            let _g = enter("work");
            if bail {
                return 1;
            }
            2
        }

        assert_eq!(work(true), 1);
        assert_eq!(work(false), 2);
        assert_eq!(current_depth(), 0);
    }

    #[test]
    fn test_panic_pops() {
        let result = catch_unwind(AssertUnwindSafe(|| {
            profile("outer", || {
                profile("inner", || panic!("boom"));
            })
        }));
        assert!(result.is_err());
        assert_eq!(current_depth(), 0);
    }

    #[test]
    fn test_recursive_same_name() {
        fn recurse(n: u32, seen: &mut Vec<ScopePath>) {
            let _g = enter("walk");
            seen.push(current_path());
            if n > 0 {
                recurse(n - 1, seen);
            }
        }

        let mut seen = Vec::new();
        recurse(2, &mut seen);
        assert_eq!(seen[2], ScopePath::new(["walk", "walk", "walk"]));
        assert_eq!(current_depth(), 0);
    }

    #[test]
    fn test_close_out_of_order_returns_guard() {
        let outer = enter("outer");
        let inner = enter("inner");

        let failed = outer.close().unwrap_err();
        assert!(matches!(failed.error, CoreError::UnbalancedScopeStack { .. }));
        assert_eq!(current_path(), ScopePath::new(["outer", "inner"]));

        inner.close().unwrap();
        assert_eq!(current_path(), ScopePath::new(["outer"]));

        failed.guard.close().unwrap();
        assert_eq!(current_depth(), 0);
    }

    #[test]
    fn test_drop_out_of_order_panics() {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let outer = enter("outer");
            let _inner = enter("inner");
            drop(outer);
        }));
        let payload = result.unwrap_err();
        let message = payload.downcast_ref::<String>().unwrap();
        assert!(message.starts_with("Unbalanced scope stack"));
        clear_thread_stack();
    }

    #[test]
    fn test_threads_have_independent_stacks() {
        let _main = enter("main");
        let other = std::thread::spawn(current_path).join().unwrap();
        assert!(other.is_unattributed());
    }

    #[test]
    fn test_explicit_stack_guards() {
        let mut stack = ScopeStack::new();
        {
            let mut pipeline = stack.enter("pipeline");
            {
                let fetch = pipeline.enter("fetch");
                assert_eq!(fetch.path(), ScopePath::new(["pipeline", "fetch"]));
            }
            assert_eq!(pipeline.path(), ScopePath::new(["pipeline"]));
        }
        assert!(stack.is_empty());
    }

    #[test]
    fn test_stack_pop_checks_name_and_depth() {
        let mut stack = ScopeStack::new();
        let depth = stack.push("a");
        assert!(stack.pop("b", depth).is_err());
        assert!(stack.pop("a", depth + 1).is_err());
        assert!(stack.pop("a", depth).is_ok());
        assert!(stack.is_empty());
    }

    #[tokio::test]
    async fn test_in_scope_async() {
        let path = in_scope("job", async {
            in_scope("step", async { current_path() }).await
        })
        .await;
        assert_eq!(path, ScopePath::new(["job", "step"]));
        assert_eq!(current_depth(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawned_tasks_inherit_and_isolate() {
        let (a, b) = in_scope("parent", async {
            let a = tokio::spawn(inherit_scope(in_scope("a", async {
                tokio::task::yield_now().await;
                current_path()
            })));
            let b = tokio::spawn(inherit_scope(in_scope("b", async {
                tokio::task::yield_now().await;
                current_path()
            })));
            (a.await.unwrap(), b.await.unwrap())
        })
        .await;

        assert_eq!(a, ScopePath::new(["parent", "a"]));
        assert_eq!(b, ScopePath::new(["parent", "b"]));
    }

    #[tokio::test]
    async fn test_cancelled_future_still_pops() {
        let outcome = in_scope("outer", async {
            let slow = in_scope("slow", async {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            });
            let timed_out =
                tokio::time::timeout(std::time::Duration::from_millis(10), slow).await;
            (timed_out.is_err(), current_path())
        })
        .await;

        assert!(outcome.0);
        assert_eq!(outcome.1, ScopePath::new(["outer"]));
    }
}
