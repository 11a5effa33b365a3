//! Driver-specific placeholder rendering.
//!
//! A [`Dialect`] turns a bound parameter into the token the driver expects in
//! statement text. [`DialectRules`] maps driver identities to dialects; it is
//! an immutable value handed to the [`Binder`](crate::Binder), and
//! [`with_rule`](DialectRules::with_rule) produces a new copy instead of
//! mutating shared state.
//!
//! | driver identity | token for the first parameter |
//! |-----------------|-------------------------------|
//! | `MySQL`         | `?`    |
//! | `PostgreSQL`    | `$1`   |
//! | `SQLite`        | `?1`   |
//! | `MSSQL`         | `@p0`  |
//! | `Oracle`        | `:p0`  |
//! | `ODBC`          | `?`    |
//! | anything else   | `p0`   |

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One placeholder occurrence, as seen by a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder<'a> {
    /// Parameter name, synthesized or caller-supplied.
    pub name: &'a str,
    /// Zero-based position in the bound parameter list.
    pub ordinal: usize,
    /// Text that followed the index inside the braces, e.g. `:x` in `{0:x}`.
    pub format: &'a str,
}

type RenderFn = dyn Fn(&Placeholder<'_>) -> String + Send + Sync;

/// How parameter tokens are written into statement text.
#[derive(Clone)]
pub enum Dialect {
    /// Prefix followed by the parameter name, e.g. `@p0`.
    Named(Cow<'static, str>),
    /// The same marker for every parameter, e.g. `?`.
    Positional(Cow<'static, str>),
    /// Prefix followed by the one-based ordinal, e.g. `$1`.
    Numbered(Cow<'static, str>),
    /// Arbitrary rendering function.
    Custom(Arc<RenderFn>),
}

impl Dialect {
    /// Bare parameter names, used for unregistered drivers.
    pub const UNPREFIXED: Dialect = Dialect::Named(Cow::Borrowed(""));

    pub fn custom<F>(render: F) -> Self
    where
        F: Fn(&Placeholder<'_>) -> String + Send + Sync + 'static,
    {
        Dialect::Custom(Arc::new(render))
    }

    /// Appends the token for `placeholder` to `out`.
    pub fn render_into(&self, out: &mut String, placeholder: &Placeholder<'_>) {
        match self {
            Dialect::Named(prefix) => {
                out.push_str(prefix);
                out.push_str(placeholder.name);
            }
            Dialect::Positional(marker) => out.push_str(marker),
            Dialect::Numbered(prefix) => {
                out.push_str(prefix);
                out.push_str(&(placeholder.ordinal + 1).to_string());
            }
            Dialect::Custom(render) => out.push_str(&render(placeholder)),
        }
    }

    /// Whether a token can be repeated to refer to an already bound parameter.
    ///
    /// `true` for named and numbered tokens. Positional markers and custom
    /// renderers need one parameter per occurrence.
    pub fn reuses_parameters(&self) -> bool {
        matches!(self, Dialect::Named(_) | Dialect::Numbered(_))
    }

    pub fn render(&self, placeholder: &Placeholder<'_>) -> String {
        let mut out = String::new();
        self.render_into(&mut out, placeholder);
        out
    }
}

impl fmt::Debug for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Named(prefix) => f.debug_tuple("Named").field(prefix).finish(),
            Dialect::Positional(marker) => f.debug_tuple("Positional").field(marker).finish(),
            Dialect::Numbered(prefix) => f.debug_tuple("Numbered").field(prefix).finish(),
            Dialect::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Immutable driver-identity → dialect table.
#[derive(Debug, Clone)]
pub struct DialectRules {
    rules: Arc<HashMap<String, Dialect>>,
    fallback: Dialect,
}

impl DialectRules {
    /// No registered drivers; everything renders unprefixed.
    pub fn empty() -> Self {
        Self {
            rules: Arc::new(HashMap::new()),
            fallback: Dialect::UNPREFIXED,
        }
    }

    /// Rules for the drivers listed in the module docs.
    pub fn standard() -> Self {
        Self::empty()
            .with_rule("MySQL", Dialect::Positional(Cow::Borrowed("?")))
            .with_rule("PostgreSQL", Dialect::Numbered(Cow::Borrowed("$")))
            .with_rule("SQLite", Dialect::Numbered(Cow::Borrowed("?")))
            .with_rule("MSSQL", Dialect::Named(Cow::Borrowed("@")))
            .with_rule("Oracle", Dialect::Named(Cow::Borrowed(":")))
            .with_rule("ODBC", Dialect::Positional(Cow::Borrowed("?")))
    }

    /// Returns rules with `driver` mapped to `dialect`. Clones of `self` are
    /// unaffected.
    pub fn with_rule(mut self, driver: impl Into<String>, dialect: Dialect) -> Self {
        Arc::make_mut(&mut self.rules).insert(driver.into(), dialect);
        self
    }

    /// Dialect used for drivers without a rule.
    pub fn with_fallback(mut self, dialect: Dialect) -> Self {
        self.fallback = dialect;
        self
    }

    /// Looks up `driver` by exact identity, falling back when unregistered.
    pub fn resolve(&self, driver: &str) -> &Dialect {
        self.rules.get(driver).unwrap_or(&self.fallback)
    }

    /// Looks up the dialect for an SQLx database by its `NAME`.
    pub fn resolve_for<DB: sqlx::Database>(&self) -> &Dialect {
        self.resolve(DB::NAME)
    }

    pub fn is_registered(&self, driver: &str) -> bool {
        self.rules.contains_key(driver)
    }
}

impl Default for DialectRules {
    fn default() -> Self {
        Self::standard()
    }
}
