pub use serde::{Deserialize, Serialize};
pub use serde_json::{
    Map, Number, Value, from_slice, from_str, from_value, json, to_string, to_string_pretty,
    to_value, to_vec, to_vec_pretty,
};
