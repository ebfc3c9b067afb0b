//! JS オブジェクトを RegionOracle として使う
//!
//! ホストは次の 2 メソッドを持つオブジェクトを渡す:
//!
//! ```typescript
//! interface Oracle {
//!   query(address: bigint): { base: bigint | number, size: bigint | number, protection: number }
//!   read(address: bigint, length: number): Uint8Array
//! }
//! ```
//!
//! 例外はそのまま `OracleError::Host` になる（viewer がログに出して部分読み出しを捨てる）。

use js_sys::{Function, Reflect, Uint8Array};
use memview_region::{OracleError, Region, RegionOracle};
use memview_viewer::parse_address;
use wasm_bindgen::{JsCast, JsValue};

/// 2^53（JS の number で正確に表せる整数の上限）
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone)]
pub struct JsOracle {
    target: JsValue,
    query: Function,
    read: Function,
}

impl JsOracle {
    /// # エラー
    /// `query` / `read` メソッドがない場合
    pub fn new(target: JsValue) -> Result<Self, JsValue> {
        let query = method(&target, "query")?;
        let read = method(&target, "read")?;
        Ok(JsOracle { target, query, read })
    }
}

impl RegionOracle for JsOracle {
    fn query(&self, address: u64) -> Result<Region, OracleError> {
        let result = self
            .query
            .call1(&self.target, &JsValue::from(address))
            .map_err(host_error)?;

        let base = field_u64(&result, "base")?;
        let size = field_u64(&result, "size")?;
        let protection = field_u64(&result, "protection")?;
        let protection = u32::try_from(protection)
            .map_err(|_| OracleError::Host(format!("protection {protection:#x} out of range")))?;
        Ok(Region::new(base, size, protection))
    }

    fn read(&self, address: u64, length: u32) -> Result<Vec<u8>, OracleError> {
        let result = self
            .read
            .call2(&self.target, &JsValue::from(address), &JsValue::from(length))
            .map_err(host_error)?;
        if result.is_null() || result.is_undefined() {
            return Err(OracleError::InvalidAddress(address));
        }
        Ok(Uint8Array::new(&result).to_vec())
    }
}

fn method(target: &JsValue, name: &str) -> Result<Function, JsValue> {
    Reflect::get(target, &JsValue::from_str(name))?
        .dyn_into::<Function>()
        .map_err(|_| JsValue::from_str(&format!("oracle has no `{name}` method")))
}

fn field_u64(object: &JsValue, name: &str) -> Result<u64, OracleError> {
    let value = Reflect::get(object, &JsValue::from_str(name)).map_err(host_error)?;
    js_to_u64(&value).ok_or_else(|| OracleError::Host(format!("query result field `{name}` is not an address")))
}

/// number / bigint / 文字列 → u64
fn js_to_u64(value: &JsValue) -> Option<u64> {
    if let Some(n) = value.as_f64() {
        return (n >= 0.0 && n.fract() == 0.0 && n <= MAX_SAFE_INTEGER).then_some(n as u64);
    }
    if value.is_bigint() {
        let big: js_sys::BigInt = value.clone().unchecked_into();
        let text: String = big.to_string(10).ok()?.into();
        return text.parse().ok();
    }
    value.as_string().and_then(|s| parse_address(&s))
}

fn host_error(e: JsValue) -> OracleError {
    let message = e
        .as_string()
        .or_else(|| e.dyn_ref::<js_sys::Error>().map(|err| String::from(err.message())))
        .unwrap_or_else(|| format!("{e:?}"));
    OracleError::Host(message)
}
