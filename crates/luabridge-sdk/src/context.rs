//! HostFrame trait — the view a host function gets of one VM call
//!
//! The engine provides the concrete implementation. Host functions only
//! program against this trait, so they can be written (and tested) without
//! depending on the VM crate.

use crate::error::{BridgeError, BridgeResult};
use crate::types::{CallableId, InstanceId};
use crate::value::HostValue;

/// One invocation of a host function from inside the VM.
///
/// Arguments are indexed from 0. Results are pushed with [`HostFrame::push`];
/// the host function returns how many of the pushed values the VM should
/// take as return values (counted from the most recently pushed).
pub trait HostFrame {
    /// Handle of the calling VM instance
    fn instance(&self) -> InstanceId;

    /// Id of the callable being invoked
    fn callable(&self) -> CallableId;

    /// Number of arguments passed by the script
    fn arg_count(&self) -> usize;

    /// Project argument `index` to a host value (`Nil` when out of range)
    fn arg(&self, index: usize) -> BridgeResult<HostValue>;

    /// Push a result value
    fn push(&mut self, value: HostValue);

    /// Number of values pushed so far
    fn pushed(&self) -> usize;

    // ========================================================================
    // Provided helpers
    // ========================================================================

    /// Fail unless exactly `n` arguments were passed
    fn expect_args(&self, n: usize) -> BridgeResult<()> {
        let got = self.arg_count();
        if got != n {
            return Err(BridgeError::ArgumentError(format!(
                "expected {} argument(s), got {}",
                n, got
            )));
        }
        Ok(())
    }

    /// Argument `index` as a string
    fn str_arg(&self, index: usize) -> BridgeResult<String> {
        match self.arg(index)? {
            HostValue::Str(s) => Ok(s),
            other => Err(BridgeError::type_mismatch("string", other.type_name())),
        }
    }

    /// Argument `index` as an integer
    fn int_arg(&self, index: usize) -> BridgeResult<i64> {
        let value = self.arg(index)?;
        value
            .as_int()
            .ok_or_else(|| BridgeError::type_mismatch("integer", value.type_name()))
    }

    /// Argument `index` as a float
    fn float_arg(&self, index: usize) -> BridgeResult<f64> {
        let value = self.arg(index)?;
        value
            .as_float()
            .ok_or_else(|| BridgeError::type_mismatch("number", value.type_name()))
    }

    /// Argument `index` as a boolean
    fn bool_arg(&self, index: usize) -> BridgeResult<bool> {
        let value = self.arg(index)?;
        value
            .as_bool()
            .ok_or_else(|| BridgeError::type_mismatch("boolean", value.type_name()))
    }

    /// Push `nil`
    fn push_nil(&mut self) {
        self.push(HostValue::Nil);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecFrame {
        args: Vec<HostValue>,
        results: Vec<HostValue>,
    }

    impl HostFrame for VecFrame {
        fn instance(&self) -> InstanceId {
            InstanceId(1)
        }

        fn callable(&self) -> CallableId {
            CallableId(1)
        }

        fn arg_count(&self) -> usize {
            self.args.len()
        }

        fn arg(&self, index: usize) -> BridgeResult<HostValue> {
            Ok(self.args.get(index).cloned().unwrap_or_default())
        }

        fn push(&mut self, value: HostValue) {
            self.results.push(value);
        }

        fn pushed(&self) -> usize {
            self.results.len()
        }
    }

    #[test]
    fn test_typed_argument_helpers() {
        let frame = VecFrame {
            args: vec![HostValue::from("k"), HostValue::Float(3.0), HostValue::Bool(true)],
            results: vec![],
        };

        assert_eq!(frame.str_arg(0).unwrap(), "k");
        assert_eq!(frame.int_arg(1).unwrap(), 3);
        assert_eq!(frame.float_arg(1).unwrap(), 3.0);
        assert!(frame.bool_arg(2).unwrap());
        assert!(frame.expect_args(3).is_ok());
    }

    #[test]
    fn test_argument_errors() {
        let frame = VecFrame {
            args: vec![HostValue::Int(1)],
            results: vec![],
        };

        assert_eq!(
            frame.str_arg(0).unwrap_err(),
            BridgeError::type_mismatch("string", "number")
        );
        // Missing arguments read as nil
        assert_eq!(
            frame.int_arg(5).unwrap_err(),
            BridgeError::type_mismatch("integer", "nil")
        );
        assert!(matches!(
            frame.expect_args(2),
            Err(BridgeError::ArgumentError(_))
        ));
    }

    #[test]
    fn test_push_counts() {
        let mut frame = VecFrame {
            args: vec![],
            results: vec![],
        };
        frame.push_nil();
        frame.push(HostValue::Int(2));
        assert_eq!(frame.pushed(), 2);
    }
}
