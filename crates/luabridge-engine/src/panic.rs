//! Error relay: turns errors raised inside the VM into typed [`VmError`]s
//! and reports them to the instance's panic observer.
//!
//! The VM wraps host errors as they unwind through it (callback frames,
//! context annotations), so translation digs through the wrappers for the
//! host error that started the unwind before falling back to the VM's own
//! message.

use std::sync::Arc;

use luabridge_sdk::BridgeError;

use crate::error::{Abort, VmError};
use crate::registry::InstanceContext;

fn find_external<T>(err: &mlua::Error) -> Option<T>
where
    T: std::error::Error + Clone + 'static,
{
    match err {
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<T>().cloned(),
        mlua::Error::CallbackError { cause, .. } => find_external(cause),
        mlua::Error::WithContext { cause, .. } => find_external(cause),
        mlua::Error::BadArgument { cause, .. } => find_external(cause),
        _ => None,
    }
}

fn message_of(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::MemoryError(msg) => msg.clone(),
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::CallbackError { cause, .. } => message_of(cause),
        other => other.to_string(),
    }
}

/// Translate a VM error into a [`VmError`]
pub fn translate(err: &mlua::Error) -> VmError {
    if let Some(abort) = find_external::<Abort>(err) {
        return VmError::Aborted(abort);
    }
    if let Some(host) = find_external::<BridgeError>(err) {
        return VmError::Host(host);
    }
    match err {
        mlua::Error::SyntaxError { message, .. } => VmError::Load(message.clone()),
        other => VmError::Runtime(message_of(other)),
    }
}

/// Relay an error raised while running a chunk of `context`'s VM.
///
/// Aborts cancel the instance, so it refuses to run again.
pub fn relay(context: &Arc<InstanceContext>, err: mlua::Error) -> VmError {
    let error = match translate(&err) {
        VmError::Aborted(abort) => return relay_abort(context, abort),
        other => other,
    };
    tracing::debug!(instance = %context.id(), "script failed: {}", error);
    context.notify_panic(&error.to_string());
    error
}

/// Relay an abort that ended a run, whether or not the script saw it raised
pub fn relay_abort(context: &Arc<InstanceContext>, abort: Abort) -> VmError {
    tracing::warn!(instance = %context.id(), step = context.step(), "script aborted: {}", abort);
    context.cancel();

    let error = VmError::Aborted(abort);
    context.notify_panic(&error.to_string());
    error
}

/// Relay an error raised while compiling a chunk; the observer is not told
pub fn relay_load(context: &Arc<InstanceContext>, err: mlua::Error) -> VmError {
    let error = match translate(&err) {
        VmError::Runtime(msg) => VmError::Load(msg),
        other => other,
    };
    tracing::debug!(instance = %context.id(), "load failed: {}", error);
    error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_runtime() {
        let err = mlua::Error::RuntimeError("boom".into());
        let vm = translate(&err);
        assert!(matches!(&vm, VmError::Runtime(msg) if msg == "boom"));
        assert_eq!(vm.to_string(), "call error : boom");
    }

    #[test]
    fn test_translate_syntax() {
        let err = mlua::Error::SyntaxError {
            message: "unexpected symbol".into(),
            incomplete_input: false,
        };
        let vm = translate(&err);
        assert_eq!(vm.to_string(), "load error : unexpected symbol");
    }

    #[test]
    fn test_translate_abort_through_wrappers() {
        let abort = mlua::Error::external(Abort::StepLimit { step: 7, limit: 7 });
        let wrapped = mlua::Error::CallbackError {
            traceback: String::new(),
            cause: Arc::new(abort),
        };
        let vm = translate(&wrapped);
        assert_eq!(vm.abort(), Some(&Abort::StepLimit { step: 7, limit: 7 }));
        assert_eq!(vm.to_string(), "run step arrive limit 7/7");
    }

    #[test]
    fn test_translate_host_error() {
        let host = mlua::Error::external(BridgeError::MapLimit(16));
        let wrapped = mlua::Error::CallbackError {
            traceback: "stack traceback:".into(),
            cause: Arc::new(host),
        };
        assert!(matches!(translate(&wrapped), VmError::Host(BridgeError::MapLimit(16))));
    }

    #[test]
    fn test_relay_abort_cancels_and_notifies() {
        let registry = crate::registry::InstanceRegistry::new();
        let ctx = registry.register(0, None);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        ctx.set_panic_observer(Some(Arc::new(move |_, msg: &str| sink.lock().push(msg.to_string()))));

        let runtime = relay(&ctx, mlua::Error::RuntimeError("boom".into()));
        assert!(matches!(runtime, VmError::Runtime(_)));
        assert!(!ctx.is_cancelled());

        let aborted = relay_abort(&ctx, Abort::Timeout);
        assert_eq!(aborted.abort(), Some(&Abort::Timeout));
        assert!(ctx.is_cancelled());
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_callback_error_uses_cause_message() {
        let wrapped = mlua::Error::CallbackError {
            traceback: "stack traceback:".into(),
            cause: Arc::new(mlua::Error::RuntimeError("inner".into())),
        };
        assert!(matches!(translate(&wrapped), VmError::Runtime(msg) if msg == "inner"));
    }
}
