//! Renaming items according to a name pattern.
//!
//! The pattern language is parsed by [`StringPattern`]; this module supplies
//! the concrete fields: numbering (`[001]`, `[0, %d]`), the item name with
//! extension strip modes (`[name, %e]`), the item path (`[path, _, (%c)]`),
//! the output folder, and the current date.

use std::collections::HashMap;
use std::path::{Component, Path};

use chrono::format::{Item as FormatItem, StrftimeItems};
use chrono::Local;

use crate::item::ItemId;
use crate::pattern::{FieldCall, StringPattern};
use crate::tree::ItemTree;

/// Counts of matched items, used by descending numbering fields.
///
/// Captured once at the start of processing so that items dropping out of
/// the match mid-run do not shift the numbering.
#[derive(Debug, Default)]
pub struct MatchedCounts {
    total: usize,
    per_parent: HashMap<Option<ItemId>, usize>,
}

impl MatchedCounts {
    /// Count `items` (matched leaf items, in processing order).
    pub fn from_items(tree: &ItemTree, items: &[ItemId]) -> Self {
        let mut per_parent: HashMap<Option<ItemId>, usize> = HashMap::new();
        for &id in items {
            *per_parent.entry(tree.item(id).parent()).or_default() += 1;
        }
        Self {
            total: items.len(),
            per_parent,
        }
    }

    /// Total number of matched items.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of matched items directly under `parent`.
    pub fn under(&self, parent: Option<ItemId>) -> usize {
        self.per_parent.get(&parent).copied().unwrap_or(0)
    }
}

/// Everything a rename needs to know about the current run.
pub struct RenameEnv<'a> {
    /// The tree the renamed item lives in.
    pub tree: &'a ItemTree,
    /// Matched-item counts for descending numbering.
    pub counts: &'a MatchedCounts,
    /// The configured output file extension, without the leading dot.
    pub file_extension: &'a str,
    /// The configured output directory.
    pub output_directory: &'a Path,
}

struct NumberCounter {
    value: i64,
    step: i64,
    padding: usize,
}

impl NumberCounter {
    fn next(&mut self) -> String {
        let formatted = format!("{:0width$}", self.value, width = self.padding);
        self.value += self.step;
        formatted
    }
}

/// Renders a name pattern for successive items.
///
/// Each numbering-field occurrence in the pattern advances independently,
/// and counters persist across calls, so one renamer instance covers one
/// batch run.
pub struct ItemRenamer {
    pattern: StringPattern,
    // key: (field occurrence, numbering scope)
    counters: HashMap<(usize, Option<ItemId>), NumberCounter>,
}

impl ItemRenamer {
    /// Compile `pattern`.
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: StringPattern::parse(pattern),
            counters: HashMap::new(),
        }
    }

    /// Render the pattern for `item`.
    pub fn rename(&mut self, env: &RenameEnv<'_>, item: ItemId) -> String {
        let pattern = &self.pattern;
        let counters = &mut self.counters;

        pattern.substitute(|call| {
            if call.name.chars().all(|c| c.is_ascii_digit()) && !call.name.is_empty() {
                return number_field(counters, env, item, &call);
            }
            match call.name {
                "name" => name_field(env, item, call.args),
                "path" => path_field(env, item, call.args),
                "output folder" => output_folder_field(env, call.args),
                "date" => date_field(call.args),
                _ => None,
            }
        })
    }
}

fn number_field(
    counters: &mut HashMap<(usize, Option<ItemId>), NumberCounter>,
    env: &RenameEnv<'_>,
    item: ItemId,
    call: &FieldCall<'_>,
) -> Option<String> {
    let mut reset_per_parent = true;
    let mut ascending = true;
    let mut explicit_padding = None;

    for arg in call.args {
        if arg == "%n" {
            reset_per_parent = false;
        } else if let Some(padding_str) = arg.strip_prefix("%d") {
            ascending = false;
            if !padding_str.is_empty() {
                explicit_padding = Some(padding_str.parse::<usize>().ok()?);
            }
        } else {
            return None;
        }
    }

    let parent = env.tree.item(item).parent();
    let scope = if reset_per_parent { parent } else { None };

    let counter = counters
        .entry((call.occurrence, scope))
        .or_insert_with(|| {
            let mut initial: i64 = call.name.parse().unwrap_or(0);
            if initial == 0 && !ascending {
                // A descending field starting at 0 counts down from the
                // number of matched items in its scope.
                initial = if reset_per_parent {
                    env.counts.under(parent) as i64
                } else {
                    env.counts.total() as i64
                };
            }
            NumberCounter {
                value: initial,
                step: if ascending { 1 } else { -1 },
                padding: explicit_padding.unwrap_or(call.name.len()),
            }
        });

    Some(counter.next())
}

fn name_field(env: &RenameEnv<'_>, item: ItemId, args: &[String]) -> Option<String> {
    let name = &env.tree.item(item).name;
    if args.len() > 1 {
        return None;
    }
    apply_strip_mode(name, args.first().map(String::as_str).unwrap_or(""), env)
}

fn path_field(env: &RenameEnv<'_>, item: ItemId, args: &[String]) -> Option<String> {
    if args.len() > 3 {
        return None;
    }
    let separator = args.first().map(String::as_str).unwrap_or("-");
    let wrapper = component_wrapper(args.get(1));
    let strip_mode = args.get(2).map(String::as_str).unwrap_or("");

    let mut components = env.tree.parent_names(item);
    components.push(apply_strip_mode(&env.tree.item(item).name, strip_mode, env)?);

    Some(join_wrapped(&components, separator, &wrapper))
}

fn output_folder_field(env: &RenameEnv<'_>, args: &[String]) -> Option<String> {
    if args.len() > 3 {
        return None;
    }
    let strip_mode = args.first().map(String::as_str).unwrap_or("%b");
    let separator = args.get(1).map(String::as_str).unwrap_or("-");
    let wrapper = component_wrapper(args.get(2));

    let components: Vec<String> = env
        .output_directory
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let selected: &[String] = if strip_mode == "%" {
        &components
    } else if let Some(count_str) = strip_mode.strip_prefix("%b") {
        let count = parse_component_count(count_str)?;
        let start = components.len().saturating_sub(count);
        &components[start..]
    } else if let Some(count_str) = strip_mode.strip_prefix("%f") {
        let count = parse_component_count(count_str)?;
        &components[..count.min(components.len())]
    } else {
        return None;
    };

    Some(join_wrapped(selected, separator, &wrapper))
}

fn parse_component_count(count_str: &str) -> Option<usize> {
    if count_str.is_empty() {
        Some(1)
    } else {
        count_str.parse().ok()
    }
}

fn date_field(args: &[String]) -> Option<String> {
    if args.len() > 1 {
        return None;
    }
    let format = args.first().map(String::as_str).unwrap_or("%Y-%m-%d");

    // Reject invalid format strings up front; chrono's formatter panics on
    // them during rendering otherwise.
    if StrftimeItems::new(format).any(|item| matches!(item, FormatItem::Error)) {
        return None;
    }

    Some(Local::now().format(format).to_string())
}

/// Apply a `%e`/`%i`/`%n` extension strip mode to a name. The default (empty
/// mode) strips the extension.
fn apply_strip_mode(name: &str, mode: &str, env: &RenameEnv<'_>) -> Option<String> {
    let extension = file_extension(name);
    let keep = match mode {
        "" => false,
        "%e" => true,
        "%i" => extension.eq_ignore_ascii_case(env.file_extension),
        "%n" => !extension.eq_ignore_ascii_case(env.file_extension),
        _ => return None,
    };

    if keep {
        Some(name.to_string())
    } else {
        Some(name_root(name).to_string())
    }
}

/// The file extension of `name` (text after the final dot), or `""`.
pub fn file_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(position) => &name[position + 1..],
        None => "",
    }
}

/// `name` without its file extension.
pub fn name_root(name: &str) -> &str {
    match name.rfind('.') {
        Some(position) => &name[..position],
        None => name,
    }
}

fn component_wrapper(arg: Option<&String>) -> String {
    match arg {
        Some(wrapper) if wrapper.contains("%c") => wrapper.clone(),
        _ => "%c".to_string(),
    }
}

fn join_wrapped(components: &[String], separator: &str, wrapper: &str) -> String {
    components
        .iter()
        .map(|component| wrapper.replace("%c", component))
        .collect::<Vec<_>>()
        .join(separator)
}
