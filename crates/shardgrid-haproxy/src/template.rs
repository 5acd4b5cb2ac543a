//! `{{ name }}` placeholder substitution.
//!
//! A placeholder alone on its line is replaced by a block: every line of the
//! value is emitted with the placeholder's indentation. Placeholders inside
//! other text are replaced in place.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::{HaproxyError, HaproxyResult};

const PLACEHOLDER: &str = r"\{\{\s*[A-Za-z_][A-Za-z0-9_]*\s*\}\}";
const BLOCK_LINE: &str = r"^([ \t]*)\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}[ \t]*$";

pub fn render_template(template: &str, values: &BTreeMap<&str, String>) -> HaproxyResult<String> {
    let inline = Regex::new(PLACEHOLDER)?;
    let block = Regex::new(BLOCK_LINE)?;

    let mut out = String::with_capacity(template.len() * 2);
    for (i, line) in template.split_inclusive('\n').enumerate() {
        let line_no = i + 1;
        let (body, eol) = split_eol(line);

        if let Some(caps) = block.captures(body) {
            let indent = caps.get(1).map_or("", |m| m.as_str());
            let name = caps.get(2).map_or("", |m| m.as_str());
            let value = lookup(values, name, line_no)?;
            if value.is_empty() {
                continue;
            }
            let lines: Vec<String> = value
                .lines()
                .map(|l| if l.is_empty() { String::new() } else { format!("{indent}{l}") })
                .collect();
            out.push_str(&lines.join(if eol.is_empty() { "\n" } else { eol }));
            out.push_str(eol);
            continue;
        }

        let mut last = 0;
        for m in inline.find_iter(body) {
            let name = m.as_str().trim_start_matches('{').trim_end_matches('}').trim();
            out.push_str(&body[last..m.start()]);
            out.push_str(lookup(values, name, line_no)?);
            last = m.end();
        }
        out.push_str(&body[last..]);
        out.push_str(eol);
    }
    Ok(out)
}

fn lookup<'a>(values: &'a BTreeMap<&str, String>, name: &str, line: usize) -> HaproxyResult<&'a str> {
    values
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| HaproxyError::UnknownPlaceholder(name.to_string(), line))
}

fn split_eol(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}
