//! Math functions

use crate::ast::FunctionCall;
use crate::error::{EvaluationError, ValueResult};
use crate::evaluator::FormulaValue;

/// Resolve every argument to a finite number.
///
/// Fails if the call carries fewer than `N` arguments (evaluation does not
/// re-validate arity) or if any argument is not a finite number.
fn numbers<const N: usize>(call: &FunctionCall, args: &[FormulaValue]) -> ValueResult<[f64; N]> {
    let mut resolved = [0.0; N];
    if args.len() < N {
        return Err(EvaluationError::new(
            call.position,
            format!(
                "{} function needs {} argument(s), {} supplied.",
                call.name,
                N,
                args.len()
            ),
        ));
    }

    if args
        .iter()
        .any(|arg| !arg.as_number().map_or(false, f64::is_finite))
    {
        return Err(EvaluationError::new(
            call.position,
            "Arguments must be numbers.",
        ));
    }

    for (slot, arg) in resolved.iter_mut().zip(args) {
        if let Some(n) = arg.as_number() {
            *slot = n;
        }
    }
    Ok(resolved)
}

/// Add (`+`, `SUM`)
pub fn fn_add(call: &FunctionCall, args: &[FormulaValue]) -> ValueResult<FormulaValue> {
    let [a, b] = numbers(call, args)?;
    Ok(FormulaValue::Number(a + b))
}

/// Subtract (`-`, `SUB`)
pub fn fn_subtract(call: &FunctionCall, args: &[FormulaValue]) -> ValueResult<FormulaValue> {
    let [a, b] = numbers(call, args)?;
    Ok(FormulaValue::Number(a - b))
}

/// Multiply (`*`)
pub fn fn_multiply(call: &FunctionCall, args: &[FormulaValue]) -> ValueResult<FormulaValue> {
    let [a, b] = numbers(call, args)?;
    Ok(FormulaValue::Number(a * b))
}

/// Divide (`/`). Division by zero follows IEEE-754.
pub fn fn_divide(call: &FunctionCall, args: &[FormulaValue]) -> ValueResult<FormulaValue> {
    let [a, b] = numbers(call, args)?;
    Ok(FormulaValue::Number(a / b))
}

/// Exponentiate (`^`)
pub fn fn_exponentiate(call: &FunctionCall, args: &[FormulaValue]) -> ValueResult<FormulaValue> {
    let [a, b] = numbers(call, args)?;
    Ok(FormulaValue::Number(a.powf(b)))
}

/// Negate (prefix `-`)
pub fn fn_negate(call: &FunctionCall, args: &[FormulaValue]) -> ValueResult<FormulaValue> {
    let [a] = numbers(call, args)?;
    Ok(FormulaValue::Number(-a))
}

/// Factorial (postfix `!`)
pub fn fn_factorial(call: &FunctionCall, args: &[FormulaValue]) -> ValueResult<FormulaValue> {
    let [n] = numbers(call, args)?;
    Ok(FormulaValue::Number(factorial(n)))
}

/// Largest integer whose factorial is finite
const MAX_FINITE_FACTORIAL: f64 = 170.0;

/// `n * (n-1) * ...` down to zero.
///
/// Negative input yields negative infinity. A non-integer never reaches
/// zero, so the chain bottoms out below zero and the product is negative
/// infinity as well.
fn factorial(n: f64) -> f64 {
    if n < 0.0 || n.fract() != 0.0 {
        return f64::NEG_INFINITY;
    }
    if n > MAX_FINITE_FACTORIAL {
        return f64::INFINITY;
    }

    let mut acc = 1.0;
    let mut k = 1.0;
    while k <= n {
        acc *= k;
        k += 1.0;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ValueType;
    use crate::position::Position;
    use pretty_assertions::assert_eq;

    fn call(name: &str) -> FunctionCall {
        FunctionCall {
            name: name.to_string(),
            args: Vec::new(),
            return_type: ValueType::Number,
            position: Position::new(4, 1, 5),
        }
    }

    fn nums(values: &[f64]) -> Vec<FormulaValue> {
        values.iter().copied().map(FormulaValue::Number).collect()
    }

    #[test]
    fn test_binary_arithmetic() {
        let args = nums(&[6.0, 4.0]);
        assert_eq!(fn_add(&call("Add"), &args).unwrap(), FormulaValue::Number(10.0));
        assert_eq!(
            fn_subtract(&call("Subtract"), &args).unwrap(),
            FormulaValue::Number(2.0)
        );
        assert_eq!(
            fn_multiply(&call("Multiply"), &args).unwrap(),
            FormulaValue::Number(24.0)
        );
        assert_eq!(
            fn_divide(&call("Divide"), &args).unwrap(),
            FormulaValue::Number(1.5)
        );
        assert_eq!(
            fn_exponentiate(&call("Exponentiate"), &args).unwrap(),
            FormulaValue::Number(1296.0)
        );
    }

    #[test]
    fn test_divide_by_zero_is_infinite() {
        let result = fn_divide(&call("Divide"), &nums(&[1.0, 0.0])).unwrap();
        assert_eq!(result, FormulaValue::Number(f64::INFINITY));
    }

    #[test]
    fn test_non_finite_operand_rejected() {
        let err = fn_add(&call("Add"), &nums(&[f64::INFINITY, 1.0])).unwrap_err();
        assert_eq!(err.message, "Arguments must be numbers.");
        assert_eq!(err.position, Position::new(4, 1, 5));

        let err = fn_add(&call("Add"), &nums(&[f64::NAN, 1.0])).unwrap_err();
        assert_eq!(err.message, "Arguments must be numbers.");
    }

    #[test]
    fn test_non_numeric_operand_rejected() {
        let args = vec![FormulaValue::String("1".into()), FormulaValue::Number(1.0)];
        assert_eq!(
            fn_add(&call("Add"), &args).unwrap_err().message,
            "Arguments must be numbers."
        );

        let args = vec![FormulaValue::Boolean(true)];
        assert_eq!(
            fn_negate(&call("Negate"), &args).unwrap_err().message,
            "Arguments must be numbers."
        );

        let args = vec![FormulaValue::Undefined, FormulaValue::Number(1.0)];
        assert_eq!(
            fn_multiply(&call("Multiply"), &args).unwrap_err().message,
            "Arguments must be numbers."
        );
    }

    #[test]
    fn test_missing_arguments_do_not_panic() {
        let err = fn_add(&call("Add"), &nums(&[1.0])).unwrap_err();
        assert_eq!(err.message, "Add function needs 2 argument(s), 1 supplied.");
    }

    #[test]
    fn test_negate() {
        assert_eq!(
            fn_negate(&call("Negate"), &nums(&[3.0])).unwrap(),
            FormulaValue::Number(-3.0)
        );
    }

    #[test]
    fn test_factorial() {
        assert_eq!(factorial(0.0), 1.0);
        assert_eq!(factorial(1.0), 1.0);
        assert_eq!(factorial(5.0), 120.0);
        assert_eq!(factorial(10.0), 3_628_800.0);
        assert!(factorial(170.0).is_finite());
        assert_eq!(factorial(171.0), f64::INFINITY);
    }

    #[test]
    fn test_factorial_negative_and_fractional() {
        assert_eq!(factorial(-1.0), f64::NEG_INFINITY);
        assert_eq!(factorial(-0.5), f64::NEG_INFINITY);
        assert_eq!(factorial(2.5), f64::NEG_INFINITY);
        assert_eq!(
            fn_factorial(&call("Factorial"), &nums(&[-3.0])).unwrap(),
            FormulaValue::Number(f64::NEG_INFINITY)
        );
    }
}
