//! Linear chain grammar: `name[=args][,name[=args]]...`, where `args` is a
//! `:`-separated list of `key=value` or positional values. Labels and
//! multiple chains (`[in]`, `;`) are not supported.

use std::collections::HashMap;

use crate::engine::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub name: String,
    pub args: Vec<FilterArg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterArg {
    Positional(String),
    Named(String, String),
}

pub(crate) fn parse_chain(chain: &str) -> EngineResult<Vec<FilterSpec>> {
    let chain = chain.trim();
    if chain.is_empty() {
        return Err(EngineError::Syntax("empty filter chain".into()));
    }
    if chain.contains(';') {
        return Err(EngineError::Unsupported("multiple filter chains".into()));
    }
    if chain.contains('[') || chain.contains(']') {
        return Err(EngineError::Unsupported("link labels".into()));
    }

    chain.split(',').map(|part| parse_filter(part.trim())).collect()
}

/// One `name=args` element.
pub(crate) fn parse_filter(text: &str) -> EngineResult<FilterSpec> {
    let (name, args) = match text.split_once('=') {
        Some((name, args)) => (name.trim(), Some(args)),
        None => (text.trim(), None),
    };
    if name.is_empty() {
        return Err(EngineError::Syntax(format!("missing filter name in '{}'", text)));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(EngineError::Syntax(format!("bad filter name '{}'", name)));
    }

    Ok(FilterSpec {
        name: name.to_string(),
        args: args.map(parse_args).unwrap_or_default(),
    })
}

pub(crate) fn parse_args(args: &str) -> Vec<FilterArg> {
    args.split(':')
        .filter(|a| !a.is_empty())
        .map(|a| match a.split_once('=') {
            Some((k, v)) => FilterArg::Named(k.trim().to_string(), v.trim().to_string()),
            None => FilterArg::Positional(a.trim().to_string()),
        })
        .collect()
}

// ============================================================================
// Options
// ============================================================================

/// Arguments resolved against a filter's ordered option table.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    filter: String,
    values: HashMap<&'static str, String>,
}

impl FilterOptions {
    /// Positional values take option names in table order; named values
    /// must appear in the table.
    pub fn resolve(filter: &str, args: &[FilterArg], table: &[&'static str]) -> EngineResult<Self> {
        let mut values = HashMap::new();
        let mut next_positional = 0;

        for arg in args {
            match arg {
                FilterArg::Positional(value) => {
                    let key = table.get(next_positional).ok_or_else(|| {
                        EngineError::InvalidArgument(format!("too many arguments for '{}': '{}'", filter, value))
                    })?;
                    values.insert(*key, value.clone());
                    next_positional += 1;
                }
                FilterArg::Named(key, value) => {
                    let key = table.iter().find(|k| **k == key.as_str()).ok_or_else(|| EngineError::OptionNotFound {
                        filter: filter.to_string(),
                        option: key.clone(),
                    })?;
                    values.insert(*key, value.clone());
                }
            }
        }

        Ok(Self {
            filter: filter.to_string(),
            values,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_i64(&self, key: &str) -> EngineResult<Option<i64>> {
        self.get(key)
            .map(|v| {
                v.parse::<i64>().map_err(|_| {
                    EngineError::InvalidArgument(format!("{}: {} expects an integer, got '{}'", self.filter, key, v))
                })
            })
            .transpose()
    }

    /// Integer option that also accepts named constants.
    pub fn get_enum(&self, key: &str, names: &[(&str, i64)]) -> EngineResult<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => match names.iter().find(|(n, _)| *n == v) {
                Some((_, id)) => Ok(Some(*id)),
                None => self.get_i64(key),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_split_into_filters() {
        let specs = parse_chain("yadif=mode=1, scale=1280:720:flags=lanczos ,fieldorder").unwrap();
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].name, "yadif");
        assert_eq!(specs[0].args, vec![FilterArg::Named("mode".into(), "1".into())]);
        assert_eq!(
            specs[1].args,
            vec![
                FilterArg::Positional("1280".into()),
                FilterArg::Positional("720".into()),
                FilterArg::Named("flags".into(), "lanczos".into()),
            ]
        );
        assert!(specs[2].args.is_empty());
    }

    #[test]
    fn graph_syntax_is_rejected() {
        assert!(matches!(parse_chain("  "), Err(EngineError::Syntax(_))));
        assert!(matches!(parse_chain("copy;null"), Err(EngineError::Unsupported(_))));
        assert!(matches!(parse_chain("[in]copy"), Err(EngineError::Unsupported(_))));
        assert!(matches!(parse_chain("copy,,null"), Err(EngineError::Syntax(_))));
        assert!(matches!(parse_chain("=w=1"), Err(EngineError::Syntax(_))));
    }

    #[test]
    fn options_resolve_against_table() {
        let args = parse_args("640:h=480");
        let opts = FilterOptions::resolve("scale", &args, &["w", "h", "flags"]).unwrap();
        assert_eq!(opts.get_i64("w").unwrap(), Some(640));
        assert_eq!(opts.get_i64("h").unwrap(), Some(480));
        assert_eq!(opts.get("flags"), None);

        let err = FilterOptions::resolve("scale", &parse_args("depth=8"), &["w", "h"]).unwrap_err();
        assert_eq!(
            err,
            EngineError::OptionNotFound {
                filter: "scale".into(),
                option: "depth".into()
            }
        );
        assert!(FilterOptions::resolve("crop", &parse_args("1:2:3"), &["w", "h"]).is_err());
    }

    #[test]
    fn named_constants() {
        let opts = FilterOptions::resolve("yadif", &parse_args("mode=send_field:parity=1"), &["mode", "parity"]).unwrap();
        let modes = [("send_frame", 0), ("send_field", 1)];
        assert_eq!(opts.get_enum("mode", &modes).unwrap(), Some(1));
        assert_eq!(opts.get_enum("parity", &modes).unwrap(), Some(1));
        let bad = FilterOptions::resolve("yadif", &parse_args("mode=sometimes"), &["mode"]).unwrap();
        assert!(bad.get_enum("mode", &modes).is_err());
    }
}
