//! 指令解析
//!
//! 从方法文档中提取 `@名称 选项 选项 ...` 形式的指令，按出现顺序返回

use annotator_core::constants::is_builtin_directive;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// 一行指令：可选的注释星号，`@` 紧跟名称，行内剩余部分为选项
static DIRECTIVE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:/?\*+)?[ \t]*@([A-Za-z0-9_]+)(?:[ \t]+([^\r\n]*))?\r?$")
        .expect("directive pattern is valid")
});

/// 解析出的单条指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// 注解名称
    pub name: String,
    /// 选项，按空白切分
    pub options: Vec<String>,
    /// 所在行号（从 1 开始）
    pub line: usize,
}

impl Directive {
    pub fn is_builtin(&self) -> bool {
        is_builtin_directive(&self.name)
    }
}

/// 指令解析器
///
/// 只识别构造时给定的名称，其余 `@xxx` 视为普通文档
#[derive(Debug, Clone)]
pub struct DirectiveParser {
    known: HashSet<String>,
}

impl DirectiveParser {
    pub fn new<I, S>(known_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: known_names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    /// 按从上到下的顺序提取指令，没有匹配时返回空列表
    pub fn parse(&self, documentation: &str) -> Vec<Directive> {
        DIRECTIVE_LINE
            .captures_iter(documentation)
            .filter_map(|caps| {
                let name = caps.get(1)?.as_str();
                if !self.is_known(name) {
                    return None;
                }
                let start = caps.get(0)?.start();
                let rest = caps.get(2).map_or("", |m| m.as_str());
                Some(Directive {
                    name: name.to_string(),
                    options: split_options(rest),
                    line: documentation[..start].matches('\n').count() + 1,
                })
            })
            .collect()
    }
}

/// 选项按空白切分，块注释结尾的 `*/` 不算选项
fn split_options(rest: &str) -> Vec<String> {
    let rest = rest.trim_end();
    let rest = rest.strip_suffix("*/").unwrap_or(rest);
    rest.split_whitespace().map(str::to_string).collect()
}

/// 便捷函数：文档为空时直接返回空列表
pub fn parse<I, S>(documentation: Option<&str>, known_names: I) -> Vec<Directive>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    match documentation {
        Some(text) if !text.trim().is_empty() => DirectiveParser::new(known_names).parse(text),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> DirectiveParser {
        DirectiveParser::new(["info", "before", "after", "around", "cache", "log", "logger"])
    }

    fn names(directives: &[Directive]) -> Vec<&str> {
        directives.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_source_order_and_options() {
        let doc = " Transfers funds.\n\n @before audit transfer\n @around retry 3   500\n @after  audit done\n";
        let directives = parser().parse(doc);

        assert_eq!(names(&directives), vec!["before", "around", "after"]);
        assert_eq!(directives[0].options, vec!["audit", "transfer"]);
        assert_eq!(directives[1].options, vec!["retry", "3", "500"]);
        assert_eq!(directives[2].options, vec!["audit", "done"]);
        assert_eq!(directives[0].line, 3);
        assert!(directives.iter().all(Directive::is_builtin));
    }

    #[test]
    fn test_block_comment_style() {
        let doc = "/**\n * Cached lookup\n *\n * @cache users 60\n * @before\tcheck */";
        let directives = parser().parse(doc);

        assert_eq!(names(&directives), vec!["cache", "before"]);
        assert_eq!(directives[0].options, vec!["users", "60"]);
        assert_eq!(directives[1].options, vec!["check"]);
        assert!(!directives[0].is_builtin());
    }

    #[test]
    fn test_unknown_and_partial_names_are_ignored() {
        let doc = "@param int $x\n@beforehand nope\n@logger file\n@log\nemail me @before x\n";
        let directives = parser().parse(doc);

        assert_eq!(names(&directives), vec!["logger", "log"]);
        assert_eq!(directives[0].options, vec!["file"]);
        assert!(directives[1].options.is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let doc = "@before a 1\r\n@after b\r\n";
        let directives = parser().parse(doc);
        assert_eq!(names(&directives), vec!["before", "after"]);
        assert_eq!(directives[0].options, vec!["a", "1"]);
        assert_eq!(directives[1].options, vec!["b"]);
    }

    #[test]
    fn test_empty_documentation() {
        assert!(parse(None, ["before"]).is_empty());
        assert!(parse(Some("   \n"), ["before"]).is_empty());
        assert!(parse(Some("plain text only"), ["before"]).is_empty());
        assert_eq!(parse(Some("@before f"), ["before"]).len(), 1);
    }
}
