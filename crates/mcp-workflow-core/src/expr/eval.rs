//! Expression evaluator and built-in functions.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

use super::parser::{BinaryOp, Expr};
use crate::error::{Result, WorkflowError};
use crate::model::rules::is_truthy;
use crate::model::Document;

pub fn evaluate(expr: &Expr, data: &Document) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) => Ok(data.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Member(base, name) => {
            let base = evaluate(base, data)?;
            Ok(base
                .as_object()
                .and_then(|map| map.get(name))
                .cloned()
                .unwrap_or(Value::Null))
        }
        Expr::Index(base, index) => {
            let base = evaluate(base, data)?;
            let index = evaluate(index, data)?;
            let value = match (&base, &index) {
                (Value::Array(items), Value::Number(n)) => n
                    .as_u64()
                    .and_then(|i| items.get(i as usize))
                    .cloned(),
                (Value::Object(map), Value::String(key)) => map.get(key).cloned(),
                _ => None,
            };
            Ok(value.unwrap_or(Value::Null))
        }
        Expr::Neg(operand) => {
            let value = evaluate(operand, data)?;
            let n = as_number(&value)?;
            Ok(number_value(-n))
        }
        Expr::Binary(op, lhs, rhs) => binary(op, lhs, rhs, data),
        Expr::Call(name, args) => {
            let args: Vec<Value> = args
                .iter()
                .map(|arg| evaluate(arg, data))
                .collect::<Result<_>>()?;
            call(name, &args)
        }
    }
}

fn binary(op: &BinaryOp, lhs: &Expr, rhs: &Expr, data: &Document) -> Result<Value> {
    // Short-circuiting logic first
    match op {
        BinaryOp::And => {
            let left = evaluate(lhs, data)?;
            if !is_truthy(&left) {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(is_truthy(&evaluate(rhs, data)?)));
        }
        BinaryOp::Or => {
            let left = evaluate(lhs, data)?;
            if is_truthy(&left) {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(is_truthy(&evaluate(rhs, data)?)));
        }
        _ => {}
    }

    let left = evaluate(lhs, data)?;
    let right = evaluate(rhs, data)?;
    match op {
        BinaryOp::Add => match (&left, &right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            _ => arithmetic(&left, &right, |a, b| a + b),
        },
        BinaryOp::Sub => arithmetic(&left, &right, |a, b| a - b),
        BinaryOp::Mul => arithmetic(&left, &right, |a, b| a * b),
        BinaryOp::Div => {
            let b = as_number(&right)?;
            if b == 0.0 {
                return Err(WorkflowError::expression("division by zero"));
            }
            arithmetic(&left, &right, |a, b| a / b)
        }
        BinaryOp::Rem => arithmetic(&left, &right, |a, b| a % b),
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(&left, &right))),
        BinaryOp::Lt => ordering(&left, &right).map(|o| Value::Bool(o.is_lt())),
        BinaryOp::Le => ordering(&left, &right).map(|o| Value::Bool(o.is_le())),
        BinaryOp::Gt => ordering(&left, &right).map(|o| Value::Bool(o.is_gt())),
        BinaryOp::Ge => ordering(&left, &right).map(|o| Value::Bool(o.is_ge())),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn arithmetic(lhs: &Value, rhs: &Value, op: fn(f64, f64) -> f64) -> Result<Value> {
    Ok(number_value(op(as_number(lhs)?, as_number(rhs)?)))
}

fn ordering(lhs: &Value, rhs: &Value) -> Result<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => as_number(lhs)?
            .partial_cmp(&as_number(rhs)?)
            .ok_or_else(|| WorkflowError::expression("values are not comparable")),
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    if let (Value::Number(a), Value::Number(b)) = (lhs, rhs) {
        return a.as_f64() == b.as_f64();
    }
    lhs == rhs
}

fn as_number(value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| WorkflowError::expression(format!("expected a number, got {value}")))
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

fn call(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "string" => Ok(Value::String(stringify(one(name, args)?))),
        "number" => match one(name, args)? {
            Value::Number(n) => Ok(Value::Number(n.clone())),
            Value::Bool(b) => Ok(Value::from(*b as i64)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(number_value)
                .map_err(|_| WorkflowError::expression(format!("$number: cannot parse {s:?}"))),
            other => Err(WorkflowError::expression(format!(
                "$number: cannot convert {other}"
            ))),
        },
        "boolean" => Ok(Value::Bool(is_truthy(one(name, args)?))),
        "lowercase" => Ok(Value::String(string_arg(name, args)?.to_lowercase())),
        "uppercase" => Ok(Value::String(string_arg(name, args)?.to_uppercase())),
        "parse" => serde_json::from_str(string_arg(name, args)?)
            .map_err(|e| WorkflowError::expression(format!("$parse: {e}"))),
        "parse_utc" => parse_utc(string_arg(name, args)?),
        "to_tz" => {
            if args.len() != 2 {
                return Err(WorkflowError::expression("$to_tz takes two arguments"));
            }
            let datetime = args[0]
                .as_str()
                .ok_or_else(|| WorkflowError::expression("$to_tz: datetime must be a string"))?;
            let zone = args[1]
                .as_str()
                .ok_or_else(|| WorkflowError::expression("$to_tz: zone must be a string"))?;
            to_tz(datetime, zone)
        }
        "now_utc" => Ok(Value::String(
            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
        )),
        other => Err(WorkflowError::expression(format!(
            "unknown function: ${other}"
        ))),
    }
}

fn one<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value> {
    match args {
        [value] => Ok(value),
        _ => Err(WorkflowError::expression(format!(
            "${name} takes one argument"
        ))),
    }
}

fn string_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a str> {
    one(name, args)?.as_str().ok_or_else(|| {
        WorkflowError::expression(format!("${name} expects a string argument"))
    })
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse an ISO datetime; a value without a UTC offset is interpreted as UTC.
fn parse_utc(text: &str) -> Result<Value> {
    if let Ok(aware) = DateTime::parse_from_rfc3339(text) {
        return Ok(Value::String(
            aware
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, false),
        ));
    }
    let naive = parse_naive(text).ok_or_else(|| {
        WorkflowError::expression(format!("$parse_utc: invalid datetime {text:?}"))
    })?;
    Ok(Value::String(
        Utc.from_utc_datetime(&naive)
            .to_rfc3339_opts(SecondsFormat::Secs, false),
    ))
}

/// Convert a timezone-aware datetime into an IANA zone.
fn to_tz(text: &str, zone: &str) -> Result<Value> {
    let aware = match DateTime::parse_from_rfc3339(text) {
        Ok(aware) => aware,
        Err(_) => {
            if parse_naive(text).is_some() {
                return Err(WorkflowError::expression("datetime must be timezone-aware"));
            }
            return Err(WorkflowError::expression(format!(
                "$to_tz: invalid datetime {text:?}"
            )));
        }
    };
    let tz: chrono_tz::Tz = zone
        .parse()
        .map_err(|_| WorkflowError::expression(format!("$to_tz: unknown timezone {zone:?}")))?;
    Ok(Value::String(
        aware
            .with_timezone(&tz)
            .to_rfc3339_opts(SecondsFormat::Secs, false),
    ))
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive);
        }
    }
    None
}
