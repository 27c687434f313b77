//! SQL dialect differences the builder and codec care about.

/// Target SQL dialect.
///
/// The builder always emits `?` placeholders; the dialect only decides how identifiers are
/// delimited and how string literals are escaped when values are inlined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// MySQL / MariaDB (backtick identifiers, backslash escapes)
    #[default]
    Mysql,
    /// PostgreSQL (double-quoted identifiers, standard-conforming strings)
    Postgres,
}

/// Words that must be delimited when used as identifiers.
const RESERVED: &[&str] = &[
    "add", "all", "alter", "and", "as", "asc", "between", "by", "case", "check", "column",
    "create", "cross", "default", "delete", "desc", "distinct", "drop", "else", "end", "exists",
    "from", "full", "group", "having", "in", "index", "inner", "insert", "into", "is", "join",
    "key", "left", "like", "limit", "not", "null", "offset", "on", "or", "order", "outer",
    "primary", "references", "right", "select", "set", "table", "then", "to", "union", "unique",
    "update", "user", "using", "values", "when", "where", "with",
];

impl Dialect {
    /// Identifier delimiter character.
    pub const fn delimiter(self) -> char {
        match self {
            Dialect::Mysql => '`',
            Dialect::Postgres => '"',
        }
    }

    /// Wrap a single identifier in delimiters, doubling embedded delimiters.
    ///
    /// Already-delimited input is returned unchanged.
    pub fn wrap(self, name: &str) -> String {
        let d = self.delimiter();
        if name.contains(d) {
            return name.to_string();
        }
        format!("{d}{name}{d}")
    }

    /// Quote a possibly dotted identifier, delimiting only the segments that need it.
    ///
    /// `items.*` and `name` pass through; `order` becomes `` `order` ``; `user table` becomes
    /// `` `user table` ``. Segments already containing the delimiter are left alone.
    pub fn quote_ident(self, ident: &str) -> String {
        let d = self.delimiter();
        if ident.contains(d) {
            return ident.to_string();
        }
        ident
            .split('.')
            .map(|seg| {
                if seg == "*" || !needs_quoting(seg) {
                    seg.to_string()
                } else {
                    self.wrap(seg)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Escape a string and wrap it as a literal.
    pub fn quote_literal(self, s: &str) -> String {
        match self {
            Dialect::Mysql => format!("'{}'", self.escape_string(s)),
            Dialect::Postgres => {
                if s.chars().any(|c| c == '\\' || c.is_control()) {
                    format!("E'{}'", escape_backslash(s))
                } else {
                    format!("'{}'", self.escape_string(s))
                }
            }
        }
    }

    /// Escape characters significant inside a string literal, without quoting.
    pub fn escape_string(self, s: &str) -> String {
        match self {
            Dialect::Mysql => escape_backslash(s),
            Dialect::Postgres => s.replace('\'', "''"),
        }
    }

    /// Catalog query checking whether a table exists; binds the table name once.
    pub const fn table_exists_sql(self) -> &'static str {
        match self {
            Dialect::Mysql => {
                "SELECT COUNT(*) AS count FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?"
            }
            Dialect::Postgres => {
                "SELECT COUNT(*) AS count FROM information_schema.tables \
                 WHERE table_schema = ANY(current_schemas(false)) AND table_name = ?"
            }
        }
    }
}

fn needs_quoting(seg: &str) -> bool {
    let mut chars = seg.chars();
    let Some(first) = chars.next() else {
        return true;
    };
    if !(first == '_' || first.is_ascii_alphabetic()) {
        return true;
    }
    if !chars.all(|c| c == '_' || c.is_ascii_alphanumeric()) {
        return true;
    }
    RESERVED.contains(&seg.to_ascii_lowercase().as_str())
}

fn escape_backslash(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x08' => out.push_str("\\b"),
            '\x1a' => out.push_str("\\Z"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers_pass_through() {
        let d = Dialect::Mysql;
        assert_eq!(d.quote_ident("name"), "name");
        assert_eq!(d.quote_ident("items.*"), "items.*");
        assert_eq!(d.quote_ident("items.proto_id"), "items.proto_id");
    }

    #[test]
    fn reserved_and_unusual_identifiers_are_delimited() {
        assert_eq!(Dialect::Mysql.quote_ident("order"), "`order`");
        assert_eq!(Dialect::Mysql.quote_ident("t.group"), "t.`group`");
        assert_eq!(Dialect::Postgres.quote_ident("user name"), "\"user name\"");
        assert_eq!(Dialect::Mysql.quote_ident("`x`.y"), "`x`.y");
    }

    #[test]
    fn wrap_always_delimits() {
        assert_eq!(Dialect::Mysql.wrap("items"), "`items`");
        assert_eq!(Dialect::Postgres.wrap("items"), "\"items\"");
        assert_eq!(Dialect::Mysql.wrap("`items`"), "`items`");
    }

    #[test]
    fn mysql_literals_use_backslash_escapes() {
        assert_eq!(Dialect::Mysql.quote_literal("it's"), "'it\\'s'");
        assert_eq!(Dialect::Mysql.quote_literal("a\\b\n"), "'a\\\\b\\n'");
    }

    #[test]
    fn postgres_literals_double_quotes() {
        assert_eq!(Dialect::Postgres.quote_literal("it's"), "'it''s'");
        assert_eq!(Dialect::Postgres.quote_literal("a\\b"), "E'a\\\\b'");
    }
}
