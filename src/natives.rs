use super::object::{NativeContext, NativeFn};
use super::value::Value;
use rand::Rng;

/// CPU seconds: how long this interpreter has been alive.
pub fn clock(context: &NativeContext, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::Number(context.created_at.elapsed().as_secs_f64()))
}

pub fn random(_context: &NativeContext, _args: &[Value]) -> Result<Value, String> {
    let mut rng = rand::thread_rng();
    Ok(Value::Number(rng.gen_range(0.0..1.0)))
}

pub const NATIVES: [(&str, NativeFn); 2] = [("clock", clock), ("random", random)];
