use jobcore_core::{CoreError, CoreResult};
use regex::Regex;

use super::{Selector, SelectorSpec, Stage};
use crate::candidate::Candidate;

pub const MATCHES: &str = "matches";
pub const EXCLUDES: &str = "excludes";
pub const REPO_MATCHES: &str = "repoMatches";
pub const REPO_EXCLUDES: &str = "repoExcludes";
pub const NS_MATCHES: &str = "nsMatches";
pub const NS_EXCLUDES: &str = "nsExcludes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoration {
    Matches,
    Excludes,
    RepoMatches,
    RepoExcludes,
    NsMatches,
    NsExcludes,
}

/// 支持 `**` 的glob选择器
#[derive(Debug)]
pub struct DoublestarSelector {
    decoration: Decoration,
    pattern: Option<Regex>,
    untagged: bool,
}

impl DoublestarSelector {
    pub fn from_spec(spec: &SelectorSpec) -> CoreResult<Self> {
        let decoration = match spec.decoration.as_str() {
            MATCHES => Decoration::Matches,
            EXCLUDES => Decoration::Excludes,
            REPO_MATCHES => Decoration::RepoMatches,
            REPO_EXCLUDES => Decoration::RepoExcludes,
            NS_MATCHES => Decoration::NsMatches,
            NS_EXCLUDES => Decoration::NsExcludes,
            _ => return Err(spec.unknown_decoration()),
        };
        let pattern = spec
            .string_pattern()?
            .map(|p| compile_glob(&p))
            .transpose()?;

        Ok(Self {
            decoration,
            pattern,
            untagged: spec.untagged()?,
        })
    }

    fn is_match(&self, value: &str) -> bool {
        self.pattern.as_ref().map_or(true, |re| re.is_match(value))
    }

    fn excluded(&self, value: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(value))
    }

    fn accepts(&self, candidate: &Candidate) -> bool {
        match self.decoration {
            Decoration::Matches => {
                if candidate.tags.is_empty() {
                    return self.untagged;
                }
                candidate.tags.iter().any(|t| self.is_match(t))
            }
            Decoration::Excludes => {
                if candidate.tags.is_empty() {
                    return self.untagged;
                }
                candidate.tags.iter().any(|t| !self.excluded(t))
            }
            Decoration::RepoMatches => self.is_match(&candidate.repository),
            Decoration::RepoExcludes => !self.excluded(&candidate.repository),
            Decoration::NsMatches => self.is_match(&candidate.namespace),
            Decoration::NsExcludes => !self.excluded(&candidate.namespace),
        }
    }
}

impl Selector for DoublestarSelector {
    fn stage(&self) -> Stage {
        match self.decoration {
            Decoration::Matches | Decoration::Excludes => Stage::Tag,
            _ => Stage::Repository,
        }
    }

    fn select(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        candidates
            .iter()
            .filter(|c| self.accepts(c))
            .cloned()
            .collect()
    }
}

/// 将glob转换为锚定的正则表达式
///
/// `**` 可跨越 `/`，`*` 与 `?` 不跨越；支持 `[...]`、`[!...]` 与 `{a,b}`。
pub fn compile_glob(pattern: &str) -> CoreResult<Regex> {
    let invalid = |msg: &str| CoreError::invalid(format!("无效的glob模式 {pattern}: {msg}"));

    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    let mut brace_depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    out.push_str(".*");
                    i += 1;
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '[' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .map(|p| p + i + 1)
                    .ok_or_else(|| invalid("缺少 ]"))?;
                let mut class: String = chars[i + 1..end].iter().collect();
                if class.is_empty() {
                    return Err(invalid("空的字符类"));
                }
                if let Some(rest) = class.strip_prefix('!') {
                    class = format!("^{rest}");
                }
                out.push('[');
                out.push_str(&class.replace('\\', "\\\\").replace('[', "\\["));
                out.push(']');
                i = end;
            }
            '{' => {
                brace_depth += 1;
                out.push_str("(?:");
            }
            '}' if brace_depth > 0 => {
                brace_depth -= 1;
                out.push(')');
            }
            ',' if brace_depth > 0 => out.push('|'),
            '\\' => {
                let next = chars.get(i + 1).ok_or_else(|| invalid("末尾的转义符"))?;
                out.push_str(&regex::escape(&next.to_string()));
                i += 1;
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }

    if brace_depth > 0 {
        return Err(invalid("缺少 }"));
    }
    out.push('$');

    Regex::new(&out).map_err(|e| invalid(&e.to_string()))
}
