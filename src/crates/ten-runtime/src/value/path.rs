//! Dot/bracket path parsing: `a.b[2].c` -> `[Key("a"), Key("b"), Index(2), Key("c")]`.

use crate::error::{Result, TenError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

pub fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    let mut segs = Vec::new();
    let mut chars = path.chars().peekable();
    let mut current = String::new();

    macro_rules! flush_key {
        () => {
            if !current.is_empty() {
                segs.push(PathSegment::Key(std::mem::take(&mut current)));
            }
        };
    }

    while let Some(c) = chars.next() {
        match c {
            '.' => flush_key!(),
            '[' => {
                flush_key!();
                let mut idx = String::new();
                for c2 in chars.by_ref() {
                    if c2 == ']' {
                        break;
                    }
                    idx.push(c2);
                }
                let i: usize = idx
                    .parse()
                    .map_err(|_| TenError::invalid_argument(format!("bad index '{idx}' in path '{path}'")))?;
                segs.push(PathSegment::Index(i));
            }
            _ => current.push(c),
        }
    }
    flush_key!();

    Ok(segs)
}
