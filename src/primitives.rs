use crate::{EvalError, EvalResult, Span, Value};

// Every primitive is strictly binary: (op a b).
fn binary_operands(args: &[Value], span: Span, operator: &str) -> EvalResult<(f64, f64)> {
    let [left, right] = args else {
        return Err(EvalError::InvalidArguments(
            format!(
                "Primitive '{}' expects exactly 2 arguments, got {}",
                operator,
                args.len()
            ),
            span,
        ));
    };
    Ok((expect_number(left, span)?, expect_number(right, span)?))
}

fn expect_number(value: &Value, span: Span) -> EvalResult<f64> {
    value.as_number().ok_or_else(|| EvalError::TypeMismatch {
        expected: "number",
        found: value.type_name(),
        span,
    })
}

fn arithmetic<F: Fn(f64, f64) -> f64>(
    args: &[Value],
    span: Span,
    func: F,
    operator: &str,
) -> EvalResult<Value> {
    let (left, right) = binary_operands(args, span, operator)?;
    Ok(Value::Number(func(left, right)))
}

fn compare_numbers_with<F: Fn(f64, f64) -> bool>(
    args: &[Value],
    span: Span,
    compare: F,
    operator: &str,
) -> EvalResult<Value> {
    let (left, right) = binary_operands(args, span, operator)?;
    Ok(Value::Boolean(compare(left, right)))
}

pub fn prim_add(args: &[Value], span: Span) -> EvalResult<Value> {
    arithmetic(args, span, |left, right| left + right, "+")
}

pub fn prim_sub(args: &[Value], span: Span) -> EvalResult<Value> {
    arithmetic(args, span, |left, right| left - right, "-")
}

pub fn prim_mul(args: &[Value], span: Span) -> EvalResult<Value> {
    arithmetic(args, span, |left, right| left * right, "*")
}

pub fn prim_div(args: &[Value], span: Span) -> EvalResult<Value> {
    let (left, right) = binary_operands(args, span, "/")?;
    if right == 0.0 {
        return Err(EvalError::DivisionByZero(span));
    }
    Ok(Value::Number(left / right))
}

pub fn prim_equals(args: &[Value], span: Span) -> EvalResult<Value> {
    compare_numbers_with(args, span, |left, right| left == right, "=")
}

pub fn prim_less_than(args: &[Value], span: Span) -> EvalResult<Value> {
    compare_numbers_with(args, span, |left, right| left < right, "<")
}

pub fn prim_less_than_or_equals(args: &[Value], span: Span) -> EvalResult<Value> {
    compare_numbers_with(args, span, |left, right| left <= right, "<=")
}

pub fn prim_greater_than(args: &[Value], span: Span) -> EvalResult<Value> {
    compare_numbers_with(args, span, |left, right| left > right, ">")
}

pub fn prim_greater_than_or_equals(args: &[Value], span: Span) -> EvalResult<Value> {
    compare_numbers_with(args, span, |left, right| left >= right, ">=")
}
