//! Tolerant extraction of structured data from minified, non-executed
//! JavaScript-like bundle text.
//!
//! The portal's front-end assets (i18n packs, parameter mappings, menu
//! definitions) are shipped as minified JS. Nothing here executes that text:
//! extraction is structural, anchored on brace/quote matching and a small set
//! of known literal property names, so it survives minifier renaming of
//! wrapper identifiers. Anything unrecognized is carried through opaquely
//! rather than failing the whole parse.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::menu::{CommandRule, MenuNode, ParamRef, RuleBranch, RuleCondition, RuleLogic};
use crate::{Error, Result};

/// One channel+bit pair participating in a named status condition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusCondition {
    pub channel: String,
    pub bit: Option<u8>,
}

/// Channels of one parameter mapping, grouped by role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingChannels {
    pub value: Option<String>,
    pub command: Option<String>,
    pub unit: Option<String>,
    pub status: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
}

/// Everything the mapping bundle says about one symbolic parameter name.
///
/// Unknown source fields are preserved verbatim in `raw` instead of being
/// dropped; forward compatibility beats completeness of typed modeling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMapping {
    pub component_type: Option<String>,
    pub channels: MappingChannels,
    pub status_conditions: BTreeMap<String, Vec<StatusCondition>>,
    pub command_rules: Vec<CommandRule>,
    pub units_source: Option<String>,
    pub raw: BTreeMap<String, Value>,
}

// -- Scanner -----------------------------------------------------------------

type ScanResult<T> = std::result::Result<T, String>;

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_trivia(&mut self) {
        loop {
            while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            if self.src[self.pos..].starts_with(b"//") {
                while !matches!(self.peek(), None | Some(b'\n')) {
                    self.pos += 1;
                }
            } else if self.src[self.pos..].starts_with(b"/*") {
                self.pos += 2;
                while self.pos < self.src.len() && !self.src[self.pos..].starts_with(b"*/") {
                    self.pos += 1;
                }
                self.pos = (self.pos + 2).min(self.src.len());
            } else {
                return;
            }
        }
    }

    fn parse_value(&mut self) -> ScanResult<Value> {
        self.skip_trivia();
        match self.peek() {
            Some(b'{') => self.parse_object().map(Value::Object),
            Some(b'[') => self.parse_array(),
            Some(q @ (b'"' | b'\'' | b'`')) => self.parse_string(q).map(Value::String),
            Some(_) => self.parse_bare(),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn parse_object(&mut self) -> ScanResult<Map<String, Value>> {
        if self.bump() != Some(b'{') {
            return Err("expected '{'".to_string());
        }
        let mut map = Map::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(map);
                }
                None => return Err("unterminated object".to_string()),
                _ => {}
            }
            let key = self.parse_key()?;
            self.skip_trivia();
            if self.bump() != Some(b':') {
                return Err(format!("expected ':' after key {key:?}"));
            }
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_trivia();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1; // trailing commas fall out naturally
                }
                Some(b'}') => {}
                _ => return Err("expected ',' or '}' in object".to_string()),
            }
        }
    }

    fn parse_array(&mut self) -> ScanResult<Value> {
        if self.bump() != Some(b'[') {
            return Err("expected '['".to_string());
        }
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                None => return Err("unterminated array".to_string()),
                _ => {}
            }
            items.push(self.parse_value()?);
            self.skip_trivia();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b']') => {}
                _ => return Err("expected ',' or ']' in array".to_string()),
            }
        }
    }

    /// Object keys: string literal, identifier, or computed `[expr]` whose
    /// expression text is captured verbatim.
    fn parse_key(&mut self) -> ScanResult<String> {
        match self.peek() {
            Some(q @ (b'"' | b'\'' | b'`')) => self.parse_string(q),
            Some(b'[') => {
                self.pos += 1;
                self.skip_trivia();
                if let Some(q @ (b'"' | b'\'' | b'`')) = self.peek() {
                    // computed string key: ["KEY"]
                    let key = self.parse_string(q)?;
                    self.skip_trivia();
                    if self.bump() != Some(b']') {
                        return Err("unterminated computed key".to_string());
                    }
                    return Ok(key);
                }
                let start = self.pos;
                let mut depth = 0usize;
                loop {
                    match self.peek() {
                        None => return Err("unterminated computed key".to_string()),
                        Some(b'[') => depth += 1,
                        Some(b']') if depth == 0 => {
                            let raw =
                                String::from_utf8_lossy(&self.src[start..self.pos]).trim().to_string();
                            self.pos += 1;
                            return Ok(raw);
                        }
                        Some(b']') => depth -= 1,
                        _ => {}
                    }
                    self.pos += 1;
                }
            }
            Some(b) if b == b'$' || b == b'_' || b.is_ascii_alphanumeric() => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c == b'$' || c == b'_' || c.is_ascii_alphanumeric())
                {
                    self.pos += 1;
                }
                Ok(String::from_utf8_lossy(&self.src[start..self.pos]).into_owned())
            }
            _ => Err("expected object key".to_string()),
        }
    }

    fn parse_string(&mut self, quote: u8) -> ScanResult<String> {
        self.pos += 1; // opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated string".to_string()),
                Some(b) if b == quote => return Ok(out),
                Some(b'\\') => match self.bump() {
                    None => return Err("unterminated escape".to_string()),
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(b'r') => out.push('\r'),
                    Some(b'u') => {
                        let hex: String = (0..4)
                            .filter_map(|_| self.bump())
                            .map(|b| b as char)
                            .collect();
                        match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                            Some(c) => out.push(c),
                            None => return Err(format!("bad unicode escape \\u{hex}")),
                        }
                    }
                    Some(other) => out.push(other as char),
                },
                Some(b) => {
                    // Template interpolation text is copied verbatim; it is
                    // data to us, not code.
                    out.push(b as char);
                    if !b.is_ascii() {
                        // re-decode multi-byte sequences properly
                        out.pop();
                        let start = self.pos - 1;
                        while matches!(self.src.get(self.pos), Some(c) if !c.is_ascii()) {
                            self.pos += 1;
                        }
                        out.push_str(&String::from_utf8_lossy(&self.src[start..self.pos]));
                    }
                }
            }
        }
    }

    /// Bare value: a number, a minifier boolean, null-ish, or a dotted/call
    /// expression captured textually up to the next top-level delimiter.
    fn parse_bare(&mut self) -> ScanResult<Value> {
        let start = self.pos;
        let mut depth = 0usize;
        loop {
            match self.peek() {
                None => break,
                Some(b',' | b'}' | b']' | b')' | b';') if depth == 0 => break,
                Some(b'(' | b'[' | b'{') => {
                    depth += 1;
                    self.pos += 1;
                }
                Some(b')' | b']' | b'}') => {
                    depth -= 1;
                    self.pos += 1;
                }
                Some(q @ (b'"' | b'\'' | b'`')) => {
                    self.parse_string(q)?;
                }
                Some(_) => self.pos += 1,
            }
        }
        let raw = String::from_utf8_lossy(&self.src[start..self.pos]).trim().to_string();
        if raw.is_empty() {
            return Err("empty expression".to_string());
        }
        Ok(classify_bare(&raw))
    }
}

fn classify_bare(raw: &str) -> Value {
    match raw {
        "!0" | "true" => Value::Bool(true),
        "!1" | "false" => Value::Bool(false),
        "null" | "undefined" | "void 0" => Value::Null,
        _ => {
            if let Ok(n) = raw.parse::<f64>() {
                if let Some(num) = serde_json::Number::from_f64(n) {
                    return Value::Number(num);
                }
            }
            Value::String(raw.to_string())
        }
    }
}

/// Iterate candidate object literals in `src`, best-first scored by `score`.
/// Successfully parsed regions are skipped wholesale, so nested literals are
/// only considered through their outermost parse.
fn best_object<T>(
    src: &str,
    mut evaluate: impl FnMut(&Map<String, Value>) -> Option<(usize, T)>,
) -> Option<T> {
    let bytes = src.as_bytes();
    let mut pos = 0;
    let mut best: Option<(usize, T)> = None;
    while let Some(off) = bytes[pos..].iter().position(|&b| b == b'{') {
        let at = pos + off;
        let mut scanner = Scanner::new(src);
        scanner.pos = at;
        match scanner.parse_object() {
            Ok(map) => {
                if let Some((score, value)) = evaluate(&map) {
                    if best.as_ref().is_none_or(|(s, _)| score > *s) {
                        best = Some((score, value));
                    }
                }
                pos = scanner.pos;
            }
            Err(_) => pos = at + 1,
        }
    }
    best.map(|(_, v)| v)
}

// -- i18n extractor ----------------------------------------------------------

/// Extract the localization table: the highest-scoring object literal whose
/// leaves are strings, flattened with `.`-joined keys.
pub fn extract_i18n(src: &str) -> Result<BTreeMap<String, String>> {
    best_object(src, |map| {
        let mut flat = BTreeMap::new();
        flatten_strings(map, "", &mut flat);
        if flat.is_empty() {
            None
        } else {
            Some((flat.len(), flat))
        }
    })
    .ok_or_else(|| Error::CatalogParse("no plausible i18n object literal found".to_string()))
}

fn flatten_strings(map: &Map<String, Value>, prefix: &str, out: &mut BTreeMap<String, String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::String(s) => {
                out.insert(path, s.clone());
            }
            Value::Object(nested) => flatten_strings(nested, &path, out),
            _ => {}
        }
    }
}

// -- parameter-mapping extractor ---------------------------------------------

const MAPPING_ANCHORS: &[&str] = &[
    "type", "read", "write", "value", "command", "unit", "status", "min", "max", "units",
    "conditions", "commands",
];

/// Extract per-symbol parameter mappings from a family bundle.
pub fn extract_mappings(src: &str) -> Result<BTreeMap<String, ParamMapping>> {
    best_object(src, |map| {
        let mut mappings = BTreeMap::new();
        for (symbol, entry) in map {
            if let Value::Object(fields) = entry {
                if fields.keys().any(|k| MAPPING_ANCHORS.contains(&k.as_str())) {
                    mappings.insert(symbol.clone(), convert_mapping(fields));
                }
            }
        }
        if mappings.is_empty() {
            None
        } else {
            Some((mappings.len(), mappings))
        }
    })
    .ok_or_else(|| Error::CatalogParse("no plausible mapping object literal found".to_string()))
}

fn convert_mapping(fields: &Map<String, Value>) -> ParamMapping {
    let mut mapping = ParamMapping::default();
    for (key, value) in fields {
        match key.as_str() {
            "type" => mapping.component_type = value.as_str().map(str::to_string),
            "read" | "value" => mapping.channels.value = value.as_str().map(str::to_string),
            "write" | "command" => mapping.channels.command = value.as_str().map(str::to_string),
            "unit" => mapping.channels.unit = value.as_str().map(str::to_string),
            "status" => mapping.channels.status = value.as_str().map(str::to_string),
            "min" => mapping.channels.min = value.as_str().map(str::to_string),
            "max" => mapping.channels.max = value.as_str().map(str::to_string),
            "units" => mapping.units_source = Some(stringify(value)),
            "conditions" => mapping.status_conditions = convert_conditions(value),
            "commands" => mapping.command_rules = convert_rules(value),
            _ => {
                mapping.raw.insert(key.clone(), value.clone());
            }
        }
    }
    mapping
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Strip vendor helper wrappers off an identifier: leading segments that are
/// minified one/two-character names or the literal `helpers` token.
fn strip_helper_prefix(name: &str) -> String {
    let mut rest = name;
    while let Some((head, tail)) = rest.split_once('.') {
        if !tail.is_empty() && (head.len() <= 2 || head == "helpers") {
            rest = tail;
        } else {
            break;
        }
    }
    rest.to_string()
}

fn convert_conditions(value: &Value) -> BTreeMap<String, Vec<StatusCondition>> {
    let mut out = BTreeMap::new();
    let Some(groups) = value.as_object() else {
        return out;
    };
    for (name, members) in groups {
        let name = strip_helper_prefix(name);
        let mut conditions = Vec::new();
        let entries = match members {
            Value::Array(items) => items.as_slice(),
            single => std::slice::from_ref(single),
        };
        for entry in entries {
            match entry {
                Value::String(addr) => match addr.split_once("_bit") {
                    Some((channel, bit)) => conditions.push(StatusCondition {
                        channel: channel.to_string(),
                        bit: bit.parse().ok(),
                    }),
                    None => conditions.push(StatusCondition {
                        channel: addr.clone(),
                        bit: None,
                    }),
                },
                Value::Object(fields) => {
                    let channel = fields.get("channel").and_then(Value::as_str);
                    if let Some(channel) = channel {
                        conditions.push(StatusCondition {
                            channel: channel.to_string(),
                            bit: fields.get("bit").and_then(Value::as_u64).map(|b| b as u8),
                        });
                    }
                }
                _ => {}
            }
        }
        out.insert(name, conditions);
    }
    out
}

fn convert_rules(value: &Value) -> Vec<CommandRule> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    let mut rules = Vec::new();
    for item in items {
        let Some(fields) = item.as_object() else {
            continue;
        };
        let command = match fields.get("cmd").or_else(|| fields.get("command")) {
            Some(Value::String(s)) => strip_helper_prefix(s),
            _ => continue,
        };
        let branch = match fields.get("branch").and_then(Value::as_str) {
            Some("else") => RuleBranch::Else,
            Some("elseif" | "elseIf" | "else-if") => RuleBranch::ElseIf,
            _ => RuleBranch::If,
        };
        let mut conditions = convert_rule_conditions(fields.get("cond").or_else(|| fields.get("conditions")));
        if branch == RuleBranch::Else && !conditions.is_empty() {
            warn!(%command, "else branch carried conditions, treating as unconditional");
            conditions.clear();
        }
        let logic = match fields.get("logic").and_then(Value::as_str) {
            Some("and" | "all") => RuleLogic::All,
            Some("or" | "any") => RuleLogic::Any,
            _ if conditions.len() <= 1 => RuleLogic::Single,
            _ => RuleLogic::All,
        };
        rules.push(CommandRule {
            logic,
            branch,
            command,
            command_value: fields.get("value").cloned(),
            conditions,
        });
    }
    rules
}

fn convert_rule_conditions(value: Option<&Value>) -> Vec<RuleCondition> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for item in items {
        let Some(fields) = item.as_object() else {
            continue;
        };
        let operator = fields
            .get("op")
            .and_then(Value::as_str)
            .unwrap_or("eq")
            .to_string();
        let expected = fields.get("value").cloned().unwrap_or(Value::Null);
        let target_addresses = match fields.get("targets") {
            Some(Value::Array(targets)) => targets
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(single)) => vec![single.clone()],
            _ => Vec::new(),
        };
        out.push(RuleCondition {
            operator,
            expected,
            target_addresses,
        });
    }
    out
}

// -- menu extractor ----------------------------------------------------------

/// Extract the navigation tree. Multiple document-order roots are wrapped in
/// a synthetic unrestricted root node.
pub fn extract_menu(src: &str) -> Result<MenuNode> {
    let bytes = src.as_bytes();
    let mut pos = 0;
    let mut roots = Vec::new();
    while let Some(off) = bytes[pos..].iter().position(|&b| b == b'{') {
        let at = pos + off;
        let mut scanner = Scanner::new(src);
        scanner.pos = at;
        match scanner.parse_object() {
            Ok(map) if looks_like_menu_node(&map) => {
                roots.push(convert_menu_node(&map));
                pos = scanner.pos;
            }
            // A parsed non-node object may still wrap nodes; keep scanning
            // inside it.
            _ => pos = at + 1,
        }
    }
    match roots.len() {
        0 => Err(Error::CatalogParse("no menu nodes found".to_string())),
        1 => Ok(roots.remove(0)),
        _ => Ok(MenuNode {
            children: roots,
            ..Default::default()
        }),
    }
}

fn looks_like_menu_node(map: &Map<String, Value>) -> bool {
    map.contains_key("path")
        || (map.contains_key("name") && (map.contains_key("children") || map.contains_key("meta")))
}

fn convert_menu_node(map: &Map<String, Value>) -> MenuNode {
    let mut node = MenuNode {
        path_segment: map.get("path").map(stringify).unwrap_or_default(),
        display_name_key: map.get("name").map(stringify).unwrap_or_default(),
        icon_tag: map.get("icon").and_then(Value::as_str).map(str::to_string),
        ..Default::default()
    };

    // Permission and ref lists live under `meta` but minified bundles have
    // been seen hoisting them onto the node itself; accept both.
    for source in [Some(map), map.get("meta").and_then(Value::as_object)].into_iter().flatten() {
        if node.required_permission.is_none() {
            node.required_permission = source.get("permissionModule").map(stringify);
        }
        convert_refs(source.get("read"), &mut node.read_refs);
        convert_refs(source.get("write"), &mut node.write_refs);
        convert_refs(source.get("status"), &mut node.status_refs);
        convert_refs(source.get("special"), &mut node.special_refs);
    }

    if let Some(Value::Array(children)) = map.get("children") {
        for child in children {
            if let Some(child_map) = child.as_object() {
                if looks_like_menu_node(child_map) {
                    node.children.push(convert_menu_node(child_map));
                }
            }
        }
    }
    node
}

fn convert_refs(value: Option<&Value>, out: &mut Vec<ParamRef>) {
    let Some(Value::Array(items)) = value else {
        return;
    };
    for item in items {
        match item {
            Value::String(name) => out.push(ParamRef::new(name.clone())),
            Value::Object(fields) => {
                let name = fields
                    .get("name")
                    .or_else(|| fields.get("param"))
                    .map(stringify);
                if let Some(name) = name {
                    out.push(ParamRef {
                        name,
                        permission: fields.get("permissionModule").map(stringify),
                    });
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i18n_simple_literal() {
        let src = r#"export default { "PARAM_66": "Flow temperature", PARAM_67: 'Return temperature' }"#;
        let map = extract_i18n(src).unwrap();
        assert_eq!(map["PARAM_66"], "Flow temperature");
        assert_eq!(map["PARAM_67"], "Return temperature");
    }

    #[test]
    fn i18n_survives_minified_wrapper_and_comments() {
        let src = r#"!function(t){/* bundle */var r={MENU:{HEATING:"Heizung",/*x*/WATER:"Wasser"},units:{"1":"°C",2:"bar"},};t.exports=r}(m)"#;
        let map = extract_i18n(src).unwrap();
        assert_eq!(map["MENU.HEATING"], "Heizung");
        assert_eq!(map["MENU.WATER"], "Wasser");
        assert_eq!(map["units.1"], "\u{b0}C");
        assert_eq!(map["units.2"], "bar");
    }

    #[test]
    fn i18n_picks_largest_candidate() {
        let src = r#"var a={x:"one"};var b={k1:"a",k2:"b",k3:"c"};"#;
        let map = extract_i18n(src).unwrap();
        assert_eq!(map.len(), 3);
        assert!(map.contains_key("k1"));
    }

    #[test]
    fn i18n_template_quotes_and_trailing_commas() {
        let src = "const t = { `KEY`: `Label text`, };";
        let map = extract_i18n(src).unwrap();
        assert_eq!(map["KEY"], "Label text");
    }

    #[test]
    fn i18n_failure_is_an_error_not_a_crash() {
        assert!(matches!(
            extract_i18n("function(){return 42}"),
            Err(Error::CatalogParse(_))
        ));
        assert!(extract_i18n("").is_err());
    }

    #[test]
    fn mapping_basic_entry() {
        let src = r#"
            export const HEATING = {
                PARAM_66: {
                    type: "number",
                    read: "P4.v66", write: "P4.v66",
                    unit: "P4.u66", status: "P5.s40",
                    min: "P4.n66", max: "P4.x66",
                    units: "1",
                },
            };
        "#;
        let mappings = extract_mappings(src).unwrap();
        let m = &mappings["PARAM_66"];
        assert_eq!(m.component_type.as_deref(), Some("number"));
        assert_eq!(m.channels.value.as_deref(), Some("P4.v66"));
        assert_eq!(m.channels.command.as_deref(), Some("P4.v66"));
        assert_eq!(m.channels.unit.as_deref(), Some("P4.u66"));
        assert_eq!(m.channels.status.as_deref(), Some("P5.s40"));
        assert_eq!(m.channels.min.as_deref(), Some("P4.n66"));
        assert_eq!(m.channels.max.as_deref(), Some("P4.x66"));
        assert_eq!(m.units_source.as_deref(), Some("1"));
    }

    #[test]
    fn mapping_unknown_fields_pass_through_raw() {
        let src = r#"var x={PARAM_1:{read:"P4.v1",widget:"slider",precision:2}};"#;
        let mappings = extract_mappings(src).unwrap();
        let m = &mappings["PARAM_1"];
        assert_eq!(m.raw["widget"], serde_json::json!("slider"));
        assert_eq!(m.raw["precision"], serde_json::json!(2.0));
    }

    #[test]
    fn mapping_status_conditions_both_shapes() {
        let src = r#"var x={PARAM_2:{read:"P4.v2",conditions:{
            [h.OPTION_2_HIDDEN]: [{channel:"P5.s40",bit:3},"P5.s41_bit2"],
            PLAIN: "P5.s42",
        }}};"#;
        let mappings = extract_mappings(src).unwrap();
        let conds = &mappings["PARAM_2"].status_conditions;
        let hidden = &conds["OPTION_2_HIDDEN"];
        assert_eq!(
            hidden[0],
            StatusCondition {
                channel: "P5.s40".to_string(),
                bit: Some(3)
            }
        );
        assert_eq!(
            hidden[1],
            StatusCondition {
                channel: "P5.s41".to_string(),
                bit: Some(2)
            }
        );
        assert_eq!(conds["PLAIN"][0].bit, None);
    }

    #[test]
    fn mapping_command_rules_with_branches() {
        let src = r#"var x={PARAM_3:{read:"P4.v3",commands:[
            {branch:"if",logic:"and",cmd:m.SET_MODE,value:1,cond:[
                {op:"eq",value:2,targets:["P4.v10"]},
                {op:"gte",value:40,targets:["P4.v11","P4.v12"]},
            ]},
            {branch:"elseif",cmd:h.SET_FALLBACK,cond:[{op:"ne",value:0,targets:"P4.v13"}]},
            {branch:"else",cmd:helpers.RESET},
        ]}};"#;
        let rules = &extract_mappings(src).unwrap()["PARAM_3"].command_rules;
        assert_eq!(rules.len(), 3);

        assert_eq!(rules[0].branch, RuleBranch::If);
        assert_eq!(rules[0].logic, RuleLogic::All);
        assert_eq!(rules[0].command, "SET_MODE");
        assert_eq!(rules[0].command_value, Some(serde_json::json!(1.0)));
        assert_eq!(rules[0].conditions.len(), 2);
        assert_eq!(rules[0].conditions[1].operator, "gte");
        assert_eq!(rules[0].conditions[1].target_addresses, vec!["P4.v11", "P4.v12"]);

        assert_eq!(rules[1].branch, RuleBranch::ElseIf);
        assert_eq!(rules[1].logic, RuleLogic::Single);
        assert_eq!(rules[1].command, "SET_FALLBACK");
        assert_eq!(rules[1].conditions[0].target_addresses, vec!["P4.v13"]);

        assert_eq!(rules[2].branch, RuleBranch::Else);
        assert_eq!(rules[2].command, "RESET");
        assert!(rules[2].conditions.is_empty());
    }

    #[test]
    fn mapping_else_with_conditions_normalized_to_unconditional() {
        let src = r#"var x={P:{read:"P4.v1",commands:[
            {branch:"else",cmd:m.RESET,cond:[{op:"eq",value:1,targets:["P4.v2"]}]},
        ]}};"#;
        let rules = &extract_mappings(src).unwrap()["P"].command_rules;
        assert_eq!(rules[0].branch, RuleBranch::Else);
        assert!(rules[0].conditions.is_empty());
    }

    #[test]
    fn helper_prefix_stripping() {
        assert_eq!(strip_helper_prefix("m.SET_MODE"), "SET_MODE");
        assert_eq!(strip_helper_prefix("helpers.h.RESET"), "RESET");
        assert_eq!(strip_helper_prefix("PLAIN"), "PLAIN");
        // Long first segments are real names, not wrappers.
        assert_eq!(strip_helper_prefix("DISPLAY.LEVEL"), "DISPLAY.LEVEL");
    }

    #[test]
    fn menu_tree_with_permissions_and_refs() {
        let src = r#"export const ROUTES=[{
            path:"heating",name:"MENU.HEATING",icon:"flame",
            meta:{permissionModule:u.DISPLAY_HEATING,read:["PARAM_66"],write:[],
                  status:["P5.s40_bit3"],special:[{name:"PARAM_99",permissionModule:u.DISPLAY_SERVICE}]},
            children:[
                {path:"circuit1",name:"MENU.CIRCUIT1",meta:{read:["PARAM_70"]}},
                {path:"expert",name:"MENU.EXPERT",meta:{permissionModule:u.DISPLAY_PARAMETER_LEVEL_MAX}},
            ],
        }];"#;
        let root = extract_menu(src).unwrap();
        assert_eq!(root.path_segment, "heating");
        assert_eq!(root.display_name_key, "MENU.HEATING");
        assert_eq!(root.icon_tag.as_deref(), Some("flame"));
        // Dotted permission expression captured textually, never evaluated.
        assert_eq!(root.required_permission.as_deref(), Some("u.DISPLAY_HEATING"));
        assert_eq!(root.read_refs, vec![ParamRef::new("PARAM_66")]);
        assert_eq!(root.status_refs, vec![ParamRef::new("P5.s40_bit3")]);
        assert_eq!(root.special_refs[0].permission.as_deref(), Some("u.DISPLAY_SERVICE"));
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].path_segment, "circuit1");
        assert_eq!(
            root.children[1].required_permission.as_deref(),
            Some("u.DISPLAY_PARAMETER_LEVEL_MAX")
        );
    }

    #[test]
    fn menu_multiple_roots_get_synthetic_parent() {
        let src = r#"[{path:"a",name:"A"},{path:"b",name:"B"}]"#;
        let root = extract_menu(src).unwrap();
        assert_eq!(root.path_segment, "");
        assert!(root.required_permission.is_none());
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].path_segment, "a");
        assert_eq!(root.children[1].path_segment, "b");
    }

    #[test]
    fn menu_ignores_unclassifiable_noise() {
        let src = r#"var cfg={timeout:30};var r={path:"x",name:"X",junk:[1,2],meta:{read:["P4.v1"]}};"#;
        let root = extract_menu(src).unwrap();
        assert_eq!(root.path_segment, "x");
        assert_eq!(root.read_refs.len(), 1);
    }

    #[test]
    fn menu_absent_is_an_error() {
        assert!(matches!(
            extract_menu("var a = [1,2,3];"),
            Err(Error::CatalogParse(_))
        ));
    }

    #[test]
    fn scanner_handles_minifier_booleans_and_nullish() {
        let src = r#"var x={P:{read:"P4.v1",enabled:!0,hidden:!1,gone:null,other:void 0}}"#;
        let mappings = extract_mappings(src).unwrap();
        let raw = &mappings["P"].raw;
        assert_eq!(raw["enabled"], serde_json::json!(true));
        assert_eq!(raw["hidden"], serde_json::json!(false));
        assert_eq!(raw["gone"], serde_json::json!(null));
        assert_eq!(raw["other"], serde_json::json!(null));
    }

    #[test]
    fn extractors_are_pure() {
        let src = r#"var b={k1:"a",k2:"b"};"#;
        assert_eq!(extract_i18n(src).unwrap(), extract_i18n(src).unwrap());
    }
}
