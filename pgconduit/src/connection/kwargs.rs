//! Rewrites named parameters (`$(name)p`) into positional ones (`$1`, `$2`,
//! ...), matching each occurrence against a caller-supplied name->value map.
//!
//! Grounded on `python/psqlpy`'s `test_kwargs_parameters.py`: the same name
//! may appear more than once in a query and binds to one positional slot,
//! and a name with no matching value is a bind-time error rather than a
//! silently-NULL parameter.

use std::collections::HashMap;

use crate::error::Error;
use crate::types::ParamValue;

/// Returns the rewritten SQL (using `$1`-style placeholders) and the
/// positional parameter list built from `values`, in the order first
/// referenced.
pub fn rewrite(sql: &str, mut values: HashMap<String, ParamValue>) -> Result<(String, Vec<ParamValue>), Error> {
    let mut output = String::with_capacity(sql.len());
    let mut order: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && sql[i + 1..].starts_with('(') {
            if let Some(close) = sql[i..].find(')') {
                let name_start = i + 2;
                let name_end = i + close;
                if sql.as_bytes().get(i + close + 1) == Some(&b'p') {
                    let name = &sql[name_start..name_end];
                    let index = *positions.entry(name.to_owned()).or_insert_with(|| {
                        order.push(name.to_owned());
                        order.len()
                    });
                    output.push('$');
                    output.push_str(&index.to_string());
                    i += close + 2;
                    continue;
                }
            }
        }
        let ch = sql[i..].chars().next().unwrap();
        output.push(ch);
        i += ch.len_utf8();
    }

    let mut params = Vec::with_capacity(order.len());
    for name in &order {
        let value = values
            .remove(name)
            .ok_or_else(|| Error::Interface(format!("no value bound for named parameter `{name}`")))?;
        params.push(value);
    }

    Ok((output, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_repeated_named_parameters_to_one_slot() {
        let sql = "SELECT * FROM users WHERE id = $(id)p OR parent_id = $(id)p";
        let mut values = HashMap::new();
        values.insert("id".to_owned(), ParamValue::Int4(7));
        let (rewritten, params) = rewrite(sql, values).unwrap();
        assert_eq!(rewritten, "SELECT * FROM users WHERE id = $1 OR parent_id = $1");
        assert_eq!(params, vec![ParamValue::Int4(7)]);
    }

    #[test]
    fn errors_on_missing_value() {
        let sql = "SELECT $(name)p";
        let err = rewrite(sql, HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::Interface(_)));
    }
}
