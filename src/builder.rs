use regex::{Captures, Regex};

use crate::argument::{Argument, Parameter, Template};
use crate::pool::ObjectPool;
use crate::value::Value;
use crate::{Error, Result};

/// `{{` / `}}` escapes, or an `{index}` slot with an optional format suffix.
pub(crate) const PLACEHOLDER_PATTERN: &str = r"\{\{|\}\}|\{(?P<index>\d+)(?P<format>[^{}]*)\}";

/// Scratch buffers at or above this capacity are not returned to the pool.
const MAX_RETAINED_BUFFER: usize = 4096;

/// Default number of scratch buffers kept by an [`Expander`].
pub const DEFAULT_SCRATCH_CAPACITY: usize = 64;

/// A single bindable argument after sequence expansion.
#[derive(Debug, Clone, PartialEq)]
pub enum Bindable {
    Value(Value),
    Parameter(Parameter),
}

/// A template whose sequence arguments have been spread into separate slots.
///
/// The text is still a template: slots keep the `{index}` form and escapes
/// are left untouched, so the result can be inspected before rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Expanded {
    text: String,
    arguments: Vec<Bindable>,
}

impl Expanded {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn arguments(&self) -> &[Bindable] {
        &self.arguments
    }
}

/// Rewrites sequence-valued template arguments into one slot per element.
///
/// For an argument `i` holding `n > 0` elements, the first element takes the
/// place of argument `i` and the remaining `n - 1` are appended after the
/// original argument list. Each `{i…}` slot becomes a comma-joined list of
/// slots, every one carrying the original format suffix. An empty sequence
/// becomes a single NULL.
pub struct Expander {
    pattern: Regex,
    scratch: ObjectPool<String>,
}

impl Expander {
    /// Compiles the placeholder grammar and sets up a scratch buffer pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the placeholder pattern cannot be compiled.
    pub fn new(scratch_capacity: usize) -> Result<Self> {
        let pattern = Regex::new(PLACEHOLDER_PATTERN)?;
        let scratch = ObjectPool::builder(scratch_capacity)
            .default_constructor()
            .recycle(|buffer: &mut String| {
                let keep = buffer.capacity() < MAX_RETAINED_BUFFER;
                buffer.clear();
                keep
            })
            .build();
        Ok(Self { pattern, scratch })
    }

    pub(crate) fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub(crate) fn scratch(&self) -> &ObjectPool<String> {
        &self.scratch
    }

    /// Expands `template`.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedTemplate`] if the format is blank while arguments are
    ///   supplied, or a slot refers to a missing argument.
    /// - [`Error::UnsupportedArgument`] if a sequence contains another sequence.
    pub fn expand(&self, template: &Template) -> Result<Expanded> {
        let format = template.format();
        let arguments = template.arguments();

        if format.trim().is_empty() {
            if arguments.is_empty() {
                return Ok(Expanded {
                    text: String::new(),
                    arguments: Vec::new(),
                });
            }
            return Err(Error::MalformedTemplate(format!(
                "template is blank but {} argument(s) were supplied",
                arguments.len()
            )));
        }

        let mut flat = Vec::with_capacity(arguments.len());
        let mut appended = Vec::new();
        let mut tails = Vec::with_capacity(arguments.len());

        for (index, argument) in arguments.iter().enumerate() {
            match argument {
                Argument::Sequence(items) => match items.split_first() {
                    None => {
                        flat.push(Bindable::Value(Value::Null));
                        tails.push(None);
                    }
                    Some((first, rest)) => {
                        flat.push(single(index, first)?);
                        let start = arguments.len() + appended.len();
                        for item in rest {
                            appended.push(single(index, item)?);
                        }
                        tails.push(Some(start..start + rest.len()));
                    }
                },
                other => {
                    flat.push(single(index, other)?);
                    tails.push(None);
                }
            }
        }
        flat.extend(appended);

        let mut buffer = self.scratch.borrow()?;
        let mut last = 0;
        for caps in self.pattern.captures_iter(format) {
            let whole = whole_match(&caps);
            buffer.push_str(&format[last..whole.start()]);
            buffer.push_str(whole.as_str());
            last = whole.end();

            let Some(index) = caps.name("index") else {
                continue;
            };
            let index = slot_index(index.as_str(), arguments.len())?;
            if let Some(tail) = &tails[index] {
                let suffix = caps.name("format").map_or("", |m| m.as_str());
                for extra in tail.clone() {
                    buffer.push_str(",{");
                    buffer.push_str(&extra.to_string());
                    buffer.push_str(suffix);
                    buffer.push('}');
                }
            }
        }
        buffer.push_str(&format[last..]);

        Ok(Expanded {
            text: buffer.as_str().to_owned(),
            arguments: flat,
        })
    }
}

/// Expands `template` with a throwaway [`Expander`].
///
/// # Examples
///
/// ```
/// use sqlx_format_bind::builder::expand_template;
/// use sqlx_format_bind::template;
///
/// let expanded = expand_template(&template!("WHERE id IN ({0}) AND kind = {1}", vec![1, 2, 3], "a"))?;
/// assert_eq!(expanded.text(), "WHERE id IN ({0},{2},{3}) AND kind = {1}");
/// assert_eq!(expanded.arguments().len(), 4);
/// # Ok::<(), sqlx_format_bind::Error>(())
/// ```
pub fn expand_template(template: &Template) -> Result<Expanded> {
    Expander::new(1)?.expand(template)
}

pub(crate) fn whole_match<'t>(caps: &Captures<'t>) -> regex::Match<'t> {
    caps.get(0)
        .unwrap_or_else(|| unreachable!("capture group 0 always participates"))
}

pub(crate) fn slot_index(digits: &str, available: usize) -> Result<usize> {
    digits
        .parse::<usize>()
        .ok()
        .filter(|index| *index < available)
        .ok_or_else(|| {
            Error::MalformedTemplate(format!(
                "placeholder {{{digits}}} refers to a missing argument ({available} supplied)"
            ))
        })
}

fn single(index: usize, argument: &Argument) -> Result<Bindable> {
    match argument {
        Argument::Value(value) => Ok(Bindable::Value(value.clone())),
        Argument::Parameter(parameter) => Ok(Bindable::Parameter(parameter.clone())),
        Argument::Sequence(_) => Err(Error::UnsupportedArgument {
            index,
            reason: "nested sequences cannot be bound to a single parameter".to_owned(),
        }),
    }
}
