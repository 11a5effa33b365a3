use std::collections::{HashMap, HashSet};

use sqlx::mysql::MySqlArguments;
use sqlx::query::Query;
use sqlx::MySql;
use tracing::debug;

use crate::argument::Template;
use crate::builder::{slot_index, whole_match, Bindable, Expander, DEFAULT_SCRATCH_CAPACITY};
use crate::dialect::{Dialect, DialectRules, Placeholder};
use crate::value::Value;
use crate::Error;

/// Type alias for SQLx Query with MySQL arguments
pub type Q<'q> = Query<'q, MySql, MySqlArguments>;

/// Default prefix for synthesized parameter names (`p0`, `p1`, …).
pub const DEFAULT_PARAMETER_PREFIX: &str = "p";

/// A named value bound to one placeholder of a [`Statement`].
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    name: String,
    value: Value,
}

impl BoundParameter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

/// Driver-ready statement text and its parameters, in placeholder order.
///
/// Parameter names are unique. Every placeholder occurrence owns its own
/// parameter, except that a repeated caller-named parameter is bound once when
/// the dialect can refer back to it by name or number.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    text: String,
    parameters: Vec<BoundParameter>,
}

impl Statement {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[BoundParameter] {
        &self.parameters
    }

    pub fn into_parts(self) -> (String, Vec<BoundParameter>) {
        (self.text, self.parameters)
    }

    /// Builds an SQLx MySQL query with every parameter bound in order.
    ///
    /// The statement should have been compiled for the `MySQL` dialect so the
    /// text carries positional `?` markers.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use sqlx::MySqlPool;
    /// use sqlx_format_bind::{template, Binder};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let pool = MySqlPool::connect("mysql://localhost/test").await?;
    /// let binder = Binder::new()?;
    /// let statement = binder.compile_for::<sqlx::MySql>(&template!(
    ///     "DELETE FROM users WHERE id IN ({0})",
    ///     vec![1, 2, 3]
    /// ))?;
    ///
    /// let result = statement.to_mysql_query().execute(&pool).await?;
    /// println!("Deleted {} rows", result.rows_affected());
    /// # Ok(())
    /// # }
    /// ```
    pub fn to_mysql_query(&self) -> Q<'_> {
        self.parameters
            .iter()
            .fold(sqlx::query::<MySql>(&self.text), |q, parameter| {
                bind_value(q, &parameter.value)
            })
    }
}

fn bind_value<'q>(q: Q<'q>, value: &'q Value) -> Q<'q> {
    match value {
        Value::Null => q.bind(None::<String>),
        Value::Bool(v) => q.bind(*v),
        Value::Byte(v) => q.bind(*v),
        Value::Char(v) => q.bind(v.to_string()),
        Value::Int16(v) => q.bind(*v),
        Value::Int32(v) => q.bind(*v),
        Value::Int64(v) => q.bind(*v),
        Value::Float(v) => q.bind(*v),
        Value::Double(v) => q.bind(*v),
        Value::Decimal(v) => q.bind(v.as_str()),
        Value::Text(v) => q.bind(v.as_str()),
        Value::Bytes(v) => q.bind(v.as_slice()),
        Value::DateTime(v) => q.bind(*v),
        Value::Guid(v) => q.bind(*v),
    }
}

/// The command side of a driver: something that accepts parameters and text.
pub trait Command {
    /// Identity used to look up the placeholder dialect.
    fn driver(&self) -> &str;

    fn add_parameter(&mut self, name: &str, value: Value);

    fn set_text(&mut self, text: String);
}

/// Compiles format-string templates into driver-ready statements.
///
/// Sequence arguments are spread into one parameter per element, every
/// placeholder is rendered with the dialect of the target driver, and
/// parameters without a caller-supplied name are called `p0`, `p1`, … by
/// position, skipping any name a caller already uses.
///
/// # Examples
///
/// ```
/// use sqlx_format_bind::{template, Binder};
///
/// let binder = Binder::new()?;
/// let statement = binder.compile(
///     &template!("SELECT * FROM users WHERE id IN ({0}) AND active = {1}", vec![1, 2, 3], true),
///     "MSSQL",
/// )?;
///
/// assert_eq!(
///     statement.text(),
///     "SELECT * FROM users WHERE id IN (@p0,@p1,@p2) AND active = @p3"
/// );
/// assert_eq!(statement.parameters().len(), 4);
/// # Ok::<(), sqlx_format_bind::Error>(())
/// ```
pub struct Binder {
    expander: Expander,
    rules: DialectRules,
    parameter_prefix: String,
}

impl Binder {
    /// Creates a binder with [`DialectRules::standard`].
    ///
    /// # Errors
    ///
    /// Returns an error if the placeholder grammar cannot be compiled.
    pub fn new() -> crate::Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> BinderBuilder {
        BinderBuilder::default()
    }

    pub fn rules(&self) -> &DialectRules {
        &self.rules
    }

    /// Compiles `template` for the driver identified by `driver`.
    ///
    /// Unregistered drivers get bare parameter names as placeholders.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedTemplate`](crate::Error::MalformedTemplate) for a
    ///   blank template with arguments or a slot without an argument.
    /// - [`Error::UnsupportedArgument`](crate::Error::UnsupportedArgument) for
    ///   a sequence nested inside another sequence.
    pub fn compile(&self, template: &Template, driver: &str) -> crate::Result<Statement> {
        let dialect = self.rules.resolve(driver);
        self.compile_with(template, dialect)
    }

    /// Compiles `template` for an SQLx database type.
    pub fn compile_for<DB: sqlx::Database>(&self, template: &Template) -> crate::Result<Statement> {
        self.compile(template, DB::NAME)
    }

    /// Compiles `template` with an explicit dialect, bypassing the rules.
    ///
    /// Parameter names are unique within the statement: synthesized names skip
    /// any name a caller [`Parameter`](crate::Parameter) already uses. With a
    /// dialect that can refer back to a parameter
    /// ([`Dialect::reuses_parameters`]), a caller parameter referenced more
    /// than once is bound once and its token is repeated.
    pub fn compile_with(&self, template: &Template, dialect: &Dialect) -> crate::Result<Statement> {
        let expanded = self.expander.expand(template)?;
        let source = expanded.text();
        let arguments = expanded.arguments();

        let mut names = NameSet::reserve(arguments)?;
        let reuse = dialect.reuses_parameters();
        let mut bound: HashMap<usize, usize> = HashMap::new();

        let mut text = self.expander.scratch().borrow()?;
        let mut parameters: Vec<BoundParameter> = Vec::with_capacity(arguments.len());
        let mut last = 0;

        for caps in self.expander.pattern().captures_iter(source) {
            let whole = whole_match(&caps);
            text.push_str(&source[last..whole.start()]);
            last = whole.end();

            let Some(index) = caps.name("index") else {
                // `{{` or `}}`
                text.push_str(&whole.as_str()[..1]);
                continue;
            };
            let index = slot_index(index.as_str(), arguments.len())?;
            let format = caps.name("format").map_or("", |m| m.as_str());

            if let Some(&ordinal) = bound.get(&index) {
                dialect.render_into(
                    &mut text,
                    &Placeholder {
                        name: &parameters[ordinal].name,
                        ordinal,
                        format,
                    },
                );
                continue;
            }

            let ordinal = parameters.len();
            let (name, value) = match &arguments[index] {
                Bindable::Value(value) => (names.synthesize(&self.parameter_prefix, ordinal), value.clone()),
                Bindable::Parameter(parameter) => {
                    if reuse {
                        bound.insert(index, ordinal);
                    }
                    (names.claim(parameter.name()), parameter.value().clone())
                }
            };
            dialect.render_into(
                &mut text,
                &Placeholder {
                    name: &name,
                    ordinal,
                    format,
                },
            );
            parameters.push(BoundParameter { name, value });
        }
        text.push_str(&source[last..]);

        debug!(
            arguments = template.arguments().len(),
            parameters = parameters.len(),
            "compiled statement template"
        );

        Ok(Statement {
            text: text.as_str().to_owned(),
            parameters,
        })
    }

    /// Compiles `template` for `command`'s driver and fills the command.
    pub fn prepare<C: Command>(&self, command: &mut C, template: &Template) -> crate::Result<()> {
        let statement = self.compile(template, command.driver())?;
        let (text, parameters) = statement.into_parts();
        for parameter in parameters {
            command.add_parameter(&parameter.name, parameter.value);
        }
        command.set_text(text);
        Ok(())
    }
}

/// Parameter names already handed out within one statement.
struct NameSet {
    caller: HashSet<String>,
    used: HashSet<String>,
}

impl NameSet {
    /// Reserves every caller-supplied name up front.
    ///
    /// Two different arguments carrying the same caller name are rejected.
    fn reserve(arguments: &[Bindable]) -> crate::Result<Self> {
        let mut owners: HashMap<&str, usize> = HashMap::new();
        for (index, argument) in arguments.iter().enumerate() {
            if let Bindable::Parameter(parameter) = argument {
                let owner = *owners.entry(parameter.name()).or_insert(index);
                if owner != index {
                    return Err(Error::MalformedTemplate(format!(
                        "parameter name `{}` is supplied by more than one argument",
                        parameter.name()
                    )));
                }
            }
        }
        Ok(Self {
            caller: owners.into_keys().map(str::to_owned).collect(),
            used: HashSet::new(),
        })
    }

    fn is_free(&self, name: &str) -> bool {
        !self.caller.contains(name) && !self.used.contains(name)
    }

    /// `{prefix}{n}` for the first `n >= ordinal` nobody uses yet.
    fn synthesize(&mut self, prefix: &str, ordinal: usize) -> String {
        let name = (ordinal..)
            .map(|n| format!("{prefix}{n}"))
            .find(|name| self.is_free(name))
            .unwrap_or_else(|| unreachable!("unbounded suffix range"));
        self.used.insert(name.clone());
        name
    }

    /// The caller's name the first time, `{name}_{k}` for later occurrences.
    fn claim(&mut self, name: &str) -> String {
        let name = if self.used.contains(name) {
            (1..)
                .map(|k| format!("{name}_{k}"))
                .find(|candidate| self.is_free(candidate))
                .unwrap_or_else(|| unreachable!("unbounded suffix range"))
        } else {
            name.to_owned()
        };
        self.used.insert(name.clone());
        name
    }
}

/// Configures a [`Binder`].
#[derive(Debug, Clone)]
pub struct BinderBuilder {
    rules: DialectRules,
    parameter_prefix: String,
    scratch_capacity: usize,
}

impl Default for BinderBuilder {
    fn default() -> Self {
        Self {
            rules: DialectRules::standard(),
            parameter_prefix: DEFAULT_PARAMETER_PREFIX.to_owned(),
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
        }
    }
}

impl BinderBuilder {
    pub fn rules(mut self, rules: DialectRules) -> Self {
        self.rules = rules;
        self
    }

    /// Prefix for synthesized parameter names.
    pub fn parameter_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.parameter_prefix = prefix.into();
        self
    }

    /// Number of scratch text buffers kept for reuse.
    pub fn scratch_capacity(mut self, capacity: usize) -> Self {
        self.scratch_capacity = capacity;
        self
    }

    pub fn build(self) -> crate::Result<Binder> {
        Ok(Binder {
            expander: Expander::new(self.scratch_capacity)?,
            rules: self.rules,
            parameter_prefix: self.parameter_prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argument::{Argument, Parameter};
    use crate::template;
    use sqlx::Execute;

    fn binder() -> Binder {
        Binder::new().unwrap()
    }

    fn values(statement: &Statement) -> Vec<Value> {
        statement
            .parameters()
            .iter()
            .map(|p| p.value().clone())
            .collect()
    }

    #[test]
    fn test_compile_in_list() {
        let statement = binder()
            .compile(&template!("WHERE id IN ({0})", vec![1, 2, 3]), "MySQL")
            .unwrap();
        assert_eq!(statement.text(), "WHERE id IN (?,?,?)");
        assert_eq!(
            values(&statement),
            vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]
        );
    }

    #[test]
    fn test_parameter_count_is_scalars_plus_sequence_length() {
        let statement = binder()
            .compile(
                &template!("a = {0} AND b IN ({1}) AND c = {2}", "x", vec![5i64; 4], 1.5),
                "PostgreSQL",
            )
            .unwrap();
        assert_eq!(statement.parameters().len(), 2 + 4);
        assert_eq!(
            statement.text(),
            "a = $1 AND b IN ($2,$3,$4,$5) AND c = $6"
        );
    }

    #[test]
    fn test_empty_sequence_binds_single_null() {
        let statement = binder()
            .compile(&template!("id IN ({0})", Vec::<i32>::new()), "MSSQL")
            .unwrap();
        assert_eq!(statement.text(), "id IN (@p0)");
        assert_eq!(values(&statement), vec![Value::Null]);
    }

    #[test]
    fn test_synthesized_names_follow_ordinal() {
        let statement = binder()
            .compile(&template!("{1} {0}", 'a', 'b'), "Oracle")
            .unwrap();
        assert_eq!(statement.text(), ":p0 :p1");
        let names: Vec<_> = statement.parameters().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["p0", "p1"]);
        assert_eq!(values(&statement), vec![Value::Char('b'), Value::Char('a')]);
    }

    #[test]
    fn test_repeated_placeholder_binds_each_occurrence() {
        let statement = binder()
            .compile(&template!("id = {0} OR parent = {0}", 7), "MySQL")
            .unwrap();
        assert_eq!(statement.text(), "id = ? OR parent = ?");
        assert_eq!(values(&statement), vec![Value::Int32(7), Value::Int32(7)]);
    }

    #[test]
    fn test_caller_supplied_parameter_keeps_name() {
        let statement = binder()
            .compile(
                &template!("id = {0} AND tag IN ({1})", Parameter::new("id", 9), vec!["a", "b"]),
                "MSSQL",
            )
            .unwrap();
        assert_eq!(statement.text(), "id = @id AND tag IN (@p1,@p2)");
    }

    fn names(statement: &Statement) -> Vec<&str> {
        statement.parameters().iter().map(|p| p.name()).collect()
    }

    fn assert_unique_names(statement: &Statement) {
        let mut seen = names(statement);
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), statement.parameters().len(), "{:?}", names(statement));
    }

    #[test]
    fn test_synthesized_name_skips_caller_name() {
        let statement = binder()
            .compile(&template!("a = {0} AND b = {1}", Parameter::new("p1", 1), 2), "MSSQL")
            .unwrap();
        assert_eq!(statement.text(), "a = @p1 AND b = @p2");
        assert_eq!(names(&statement), vec!["p1", "p2"]);
        assert_eq!(values(&statement), vec![Value::Int32(1), Value::Int32(2)]);
    }

    #[test]
    fn test_caller_name_later_in_template_is_still_reserved() {
        let statement = binder()
            .compile(&template!("a = {0} AND b = {1}", 1, Parameter::new("p0", 2)), "Oracle")
            .unwrap();
        assert_eq!(statement.text(), "a = :p1 AND b = :p0");
        assert_unique_names(&statement);
    }

    #[test]
    fn test_repeated_caller_parameter_bound_once_for_named_dialect() {
        let statement = binder()
            .compile(&template!("id = {0} OR parent = {0}", Parameter::new("id", 7)), "MSSQL")
            .unwrap();
        assert_eq!(statement.text(), "id = @id OR parent = @id");
        assert_eq!(names(&statement), vec!["id"]);
        assert_eq!(values(&statement), vec![Value::Int32(7)]);
    }

    #[test]
    fn test_repeated_caller_parameter_reuses_number() {
        let statement = binder()
            .compile(
                &template!("id = {0} OR parent = {0} OR x = {1}", Parameter::new("id", 7), 8),
                "PostgreSQL",
            )
            .unwrap();
        assert_eq!(statement.text(), "id = $1 OR parent = $1 OR x = $2");
        assert_eq!(values(&statement), vec![Value::Int32(7), Value::Int32(8)]);
    }

    #[test]
    fn test_repeated_caller_parameter_positional_gets_distinct_names() {
        let statement = binder()
            .compile(&template!("id = {0} OR parent = {0}", Parameter::new("id", 7)), "MySQL")
            .unwrap();
        assert_eq!(statement.text(), "id = ? OR parent = ?");
        assert_eq!(names(&statement), vec!["id", "id_1"]);
        assert_eq!(values(&statement), vec![Value::Int32(7), Value::Int32(7)]);
    }

    #[test]
    fn test_caller_parameters_inside_sequence() {
        let tags = vec![Parameter::new("a", 1), Parameter::new("p1", 2)];
        let statement = binder()
            .compile(
                &template!("x = {1} AND (tag IN ({0}) OR alt IN ({0}))", tags, 3),
                "MSSQL",
            )
            .unwrap();
        assert_eq!(statement.text(), "x = @p0 AND (tag IN (@a,@p1) OR alt IN (@a,@p1))");
        assert_eq!(
            values(&statement),
            vec![Value::Int32(3), Value::Int32(1), Value::Int32(2)]
        );
        assert_unique_names(&statement);
    }

    #[test]
    fn test_same_caller_name_on_two_arguments_fails() {
        assert!(matches!(
            binder().compile(
                &template!("{0} {1}", Parameter::new("x", 1), Parameter::new("x", 2)),
                "MSSQL"
            ),
            Err(Error::MalformedTemplate(_))
        ));
    }

    #[test]
    fn test_unregistered_driver_uses_bare_names() {
        let statement = binder()
            .compile(&template!("x = {0}", 1), "Firebird")
            .unwrap();
        assert_eq!(statement.text(), "x = p0");
    }

    #[test]
    fn test_escaped_braces_render_literally() {
        let statement = binder()
            .compile(&template!("SELECT '{{literal}}', {0}", 1), "MySQL")
            .unwrap();
        assert_eq!(statement.text(), "SELECT '{literal}', ?");
    }

    #[test]
    fn test_custom_prefix_and_rules() {
        let binder = Binder::builder()
            .rules(DialectRules::empty().with_fallback(Dialect::Named("@".into())))
            .parameter_prefix("arg")
            .build()
            .unwrap();
        let statement = binder.compile(&template!("{0}", 1), "anything").unwrap();
        assert_eq!(statement.text(), "@arg0");
    }

    #[test]
    fn test_blank_template_with_arguments_fails() {
        assert!(matches!(
            binder().compile(&template!("", 1), "MySQL"),
            Err(Error::MalformedTemplate(_))
        ));
    }

    #[test]
    fn test_nested_sequence_fails() {
        let nested = Argument::Sequence(vec![Argument::sequence([1, 2])]);
        let template = Template::new("IN ({0})", vec![nested]);
        assert!(matches!(
            binder().compile(&template, "MySQL"),
            Err(Error::UnsupportedArgument { index: 0, .. })
        ));
    }

    #[test]
    fn test_to_mysql_query_keeps_text() {
        let statement = binder()
            .compile_for::<MySql>(&template!("SELECT * FROM t WHERE id IN ({0})", vec![1, 2]))
            .unwrap();
        let query = statement.to_mysql_query();
        assert_eq!(query.sql(), "SELECT * FROM t WHERE id IN (?,?)");
    }

    #[derive(Default)]
    struct RecordingCommand {
        text: String,
        parameters: Vec<(String, Value)>,
    }

    impl Command for RecordingCommand {
        fn driver(&self) -> &str {
            "MSSQL"
        }

        fn add_parameter(&mut self, name: &str, value: Value) {
            self.parameters.push((name.to_owned(), value));
        }

        fn set_text(&mut self, text: String) {
            self.text = text;
        }
    }

    #[test]
    fn test_prepare_fills_command() {
        let mut command = RecordingCommand::default();
        binder()
            .prepare(&mut command, &template!("name = {0}", "bob"))
            .unwrap();
        assert_eq!(command.text, "name = @p0");
        assert_eq!(
            command.parameters,
            vec![("p0".to_owned(), Value::Text("bob".into()))]
        );
    }
}
