//! The batch-processing engine.
//!
//! A [`Batcher`] walks an item tree, filters items through the configured
//! conditions, and applies the configured actions to each surviving item
//! through an [`Invoker`], resolving placeholder arguments against live run
//! state immediately before each call. One `Batcher` drives exactly one run:
//! construct, optionally grab the stop signal, then call
//! [`run`](Batcher::run).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pb_core::{Error, FailurePolicy, ImageId, LayerId, Result};
use pb_tree::renamer::MatchedCounts;
use pb_tree::{ItemId, ItemTree, ItemUniquifier, RawRef};
use serde::Serialize;

use crate::actions::{self, BuiltinAction};
use crate::command::{Argument, ArgValue, Command, CommandList};
use crate::conditions::{self, BuiltinCondition};
use crate::export::OutputPathResolver;
use crate::host::ImageHost;
use crate::invoker::{Callable, EntryId, Invoker};
use crate::overwrite::OverwriteChooser;
use crate::placeholders::resolve_args;

/// Group holding the full ordered action list.
pub const GROUP_ACTIONS: &str = "actions";
/// Group holding only name-affecting actions, driven during name-only
/// preview passes.
pub const GROUP_NAME_ONLY: &str = "name";
/// Group of cleanup callbacks, run exactly once at the end of a run.
pub const GROUP_CLEANUP: &str = "cleanup";
/// Hook group invoked once before the first item.
pub const GROUP_BEFORE_ITEMS: &str = "before_process_items";
/// Hook group invoked once after the last item.
pub const GROUP_AFTER_ITEMS: &str = "after_process_items";
/// Hook group invoked before each surviving item.
pub const GROUP_BEFORE_ITEM: &str = "before_process_item";
/// Hook group invoked after each surviving item.
pub const GROUP_AFTER_ITEM: &str = "after_process_item";

/// Run-wide settings for one batch run.
#[derive(Debug, Clone)]
pub struct BatcherOpts {
    /// Name-only preview pass: compute predicted names without touching
    /// pixel content. Only commands marked `enabled_for_previews` apply.
    pub is_preview: bool,
    /// Whether to invoke the action list on item contents.
    pub process_contents: bool,
    /// Whether to process item names (rename, uniquify, predict output
    /// names).
    pub process_names: bool,
    /// Whether the export step actually writes files.
    pub process_export: bool,
    /// Edit items in place instead of processing copies and exporting.
    pub edit_mode: bool,
    /// Pattern for the default rename step (empty = no default rename).
    pub name_pattern: String,
    /// Output file extension, without the leading dot.
    pub file_extension: String,
    /// Output directory for exported items.
    pub output_directory: PathBuf,
    /// Recreate the folder structure of the tree under the output
    /// directory instead of exporting flat.
    pub use_folder_structure: bool,
    /// What to do after an action fails for one item.
    pub failure_policy: FailurePolicy,
    /// Silently skip items whose input file cannot be loaded (full runs
    /// only; previews always fail hard so predicted output stays honest).
    pub continue_on_load_error: bool,
    /// Keep loaded/duplicated images alive after the run instead of
    /// disposing them.
    pub keep_image_copies: bool,
}

impl Default for BatcherOpts {
    fn default() -> Self {
        Self {
            is_preview: false,
            process_contents: true,
            process_names: true,
            process_export: true,
            edit_mode: false,
            name_pattern: String::new(),
            file_extension: "png".into(),
            output_directory: PathBuf::new(),
            use_folder_structure: false,
            failure_policy: FailurePolicy::default(),
            continue_on_load_error: false,
            keep_image_copies: false,
        }
    }
}

impl BatcherOpts {
    /// Settings for a name-only preview pass.
    pub fn preview() -> Self {
        Self {
            is_preview: true,
            process_contents: false,
            process_export: false,
            ..Self::default()
        }
    }
}

/// One recorded per-item failure of a command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandFailure {
    /// Name of the item being processed, if any.
    pub item: Option<String>,
    /// What went wrong.
    pub message: String,
}

/// One recorded per-item skip of a command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandSkip {
    /// Name of the item being processed, if any.
    pub item: Option<String>,
    /// Why the command skipped itself.
    pub message: String,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// All matched items were walked to the end.
    Completed,
    /// The run was canceled cooperatively; cleanup still ran.
    Canceled,
    /// A fatal error terminated the run early; cleanup still ran.
    Failed { error: String },
}

/// Status surface of one run, for the driving application to render.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Number of items that matched the conditions.
    pub matched_count: usize,
    /// Number of items processed to completion.
    pub processed_count: usize,
    /// Per-action failures, keyed by command name.
    pub failed_actions: BTreeMap<String, Vec<CommandFailure>>,
    /// Per-action voluntary skips, keyed by command name.
    pub skipped_actions: BTreeMap<String, Vec<CommandSkip>>,
    /// Per-condition failures, keyed by command name.
    pub failed_conditions: BTreeMap<String, Vec<CommandFailure>>,
    /// Per-condition voluntary skips, keyed by command name.
    pub skipped_conditions: BTreeMap<String, Vec<CommandSkip>>,
    /// Paths written by the export step, in processing order.
    pub exported: Vec<PathBuf>,
    /// Predicted output paths, recorded instead of writing during previews.
    pub predicted: Vec<(String, PathBuf)>,
}

impl RunSummary {
    /// Whether any action or condition recorded a failure.
    pub fn has_failures(&self) -> bool {
        !self.failed_actions.is_empty() || !self.failed_conditions.is_empty()
    }
}

/// Callback for reporting per-item progress to the caller.
///
/// During interactive runs this is the engine's only suspension point: the
/// host can pump its event loop (and request cancellation) from here.
pub struct ProgressSender {
    callback: Box<dyn Fn(usize, usize, &str)>,
}

impl ProgressSender {
    /// Create a sender from the given callback; arguments are items done,
    /// items total, and the name of the item just processed.
    pub fn new(callback: impl Fn(usize, usize, &str) + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// A sender that discards all reports.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_, _, _| {}),
        }
    }

    fn send(&self, done: usize, total: usize, item: &str) {
        (self.callback)(done, total, item);
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}

/// Live state of one run, visible to actions and conditions.
///
/// `current_image` and `current_layer` are exclusively owned by the engine
/// for the duration of one item's processing; actions must not retain the
/// handles beyond their own turn.
pub struct RunState<'a> {
    pub(crate) tree: &'a mut ItemTree,
    pub(crate) host: &'a mut dyn ImageHost,
    pub(crate) chooser: &'a mut dyn OverwriteChooser,
    pub(crate) opts: BatcherOpts,
    pub(crate) actions_cfg: Vec<Command>,

    pub(crate) current_item: Option<ItemId>,
    pub(crate) current_image: Option<ImageId>,
    pub(crate) current_layer: Option<LayerId>,
    pub(crate) current_action_index: Option<usize>,

    pub(crate) matched_items: Vec<ItemId>,
    pub(crate) matched_counts: MatchedCounts,
    pub(crate) uniquifier: ItemUniquifier,
    pub(crate) output_paths: OutputPathResolver,

    loaded_for_item: Option<(ItemId, PathBuf)>,
    duplicated_for_item: Option<ImageId>,
    image_copies: Vec<ImageId>,
    processed_count: usize,

    exported: Vec<PathBuf>,
    predicted: Vec<(String, PathBuf)>,
    failed_actions: BTreeMap<String, Vec<CommandFailure>>,
    skipped_actions: BTreeMap<String, Vec<CommandSkip>>,
    failed_conditions: BTreeMap<String, Vec<CommandFailure>>,
    skipped_conditions: BTreeMap<String, Vec<CommandSkip>>,

    deferred_cleanups: Vec<Callable<RunState<'a>>>,
    stop: Arc<AtomicBool>,
}

impl<'a> RunState<'a> {
    /// The item currently being processed.
    pub fn current_item(&self) -> Option<ItemId> {
        self.current_item
    }

    /// The item currently being processed; an error outside item
    /// processing.
    pub fn require_current_item(&self) -> Result<ItemId> {
        self.current_item
            .ok_or_else(|| Error::Internal("no item is being processed".into()))
    }

    /// The image currently being processed, if any.
    pub fn current_image(&self) -> Option<ImageId> {
        self.current_image
    }

    /// The layer currently being processed, if any.
    pub fn current_layer(&self) -> Option<LayerId> {
        self.current_layer
    }

    /// Replace the current layer (merge actions do this after merging).
    pub fn set_current_layer(&mut self, layer: Option<LayerId>) {
        self.current_layer = layer;
    }

    /// The item tree being processed.
    pub fn tree(&self) -> &ItemTree {
        &*self.tree
    }

    /// Mutable access to the item tree.
    pub fn tree_mut(&mut self) -> &mut ItemTree {
        &mut *self.tree
    }

    /// The host session.
    pub fn host(&self) -> &dyn ImageHost {
        &*self.host
    }

    /// Mutable access to the host session.
    pub fn host_mut(&mut self) -> &mut dyn ImageHost {
        &mut *self.host
    }

    /// Run-wide settings.
    pub fn opts(&self) -> &BatcherOpts {
        &self.opts
    }

    /// Matched-item counts captured at the start of processing.
    pub fn matched_counts(&self) -> &MatchedCounts {
        &self.matched_counts
    }

    /// The configured action list, as captured at run start.
    pub fn actions_config(&self) -> &[Command] {
        &self.actions_cfg
    }

    /// Index of the currently running action within
    /// [`actions_config`](Self::actions_config), if it came from there.
    pub fn current_action_index(&self) -> Option<usize> {
        self.current_action_index
    }

    /// Register a callback on the cleanup group, to run exactly once when
    /// the run finalizes (also after errors and cancellation).
    pub fn register_cleanup(&mut self, callable: Callable<RunState<'a>>) {
        self.deferred_cleanups.push(callable);
    }

    /// Whether a cooperative stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Whether `command` applies in the current run mode.
    pub fn command_enabled(&self, command: &Command) -> bool {
        if self.opts.is_preview {
            command.enabled && command.more_options.enabled_for_previews
        } else {
            command.enabled
        }
    }

    /// Record a file written by the export step.
    pub(crate) fn record_export(&mut self, path: PathBuf) {
        self.exported.push(path);
    }

    /// Record a predicted output path during a preview.
    pub(crate) fn record_predicted(&mut self, item: ItemId, path: PathBuf) {
        let name = self.tree.item(item).name.clone();
        self.predicted.push((name, path));
    }

    fn current_item_name(&self) -> Option<String> {
        self.current_item.map(|id| self.tree.item(id).name.clone())
    }

    pub(crate) fn record_action_skip(&mut self, command: &Command, message: String) {
        tracing::debug!(command = %command.name, %message, "action skipped");
        let item = self.current_item_name();
        self.skipped_actions
            .entry(command.name.clone())
            .or_default()
            .push(CommandSkip { item, message });
    }

    pub(crate) fn record_action_failure(&mut self, command: &Command, message: String) {
        tracing::warn!(command = %command.name, %message, "action failed");
        let item = self.current_item_name();
        self.failed_actions
            .entry(command.name.clone())
            .or_default()
            .push(CommandFailure { item, message });
    }

    fn record_condition_skip(&mut self, command: &Command, item: ItemId, message: String) {
        let item = Some(self.tree.item(item).name.clone());
        self.skipped_conditions
            .entry(command.name.clone())
            .or_default()
            .push(CommandSkip { item, message });
    }

    fn record_condition_failure(&mut self, command: &Command, item: ItemId, message: String) {
        tracing::warn!(command = %command.name, %message, "condition failed");
        let item = Some(self.tree.item(item).name.clone());
        self.failed_conditions
            .entry(command.name.clone())
            .or_default()
            .push(CommandFailure { item, message });
    }

    /// Track an image for disposal at finalization.
    pub(crate) fn track_image_copy(&mut self, image: ImageId) {
        self.image_copies.push(image);
    }

    fn begin_item(&mut self, item: ItemId) -> Result<bool> {
        self.current_item = Some(item);
        self.current_image = None;
        self.current_layer = None;

        if !self.opts.process_contents {
            return Ok(true);
        }

        let raw = self.tree.item(item).raw.clone();
        let image = match raw {
            RawRef::File(path) => match self.host.load_image(&path) {
                Ok(image) => {
                    self.loaded_for_item = Some((item, path));
                    self.tree.item_mut(item).raw = RawRef::Image(image);
                    self.track_image_copy(image);
                    Some(image)
                }
                Err(err) => {
                    // Previews fail hard so the predicted output never
                    // silently omits items.
                    if !self.opts.is_preview && self.opts.continue_on_load_error {
                        tracing::warn!(item = %self.tree.item(item).name, %err, "skipping item");
                        return Ok(false);
                    }
                    return Err(err);
                }
            },
            RawRef::Image(id) => {
                if self.opts.edit_mode {
                    Some(id)
                } else {
                    let copy = self.host.duplicate_image(id)?;
                    self.duplicated_for_item = Some(copy);
                    self.track_image_copy(copy);
                    Some(copy)
                }
            }
            RawRef::Layer(id) => {
                self.current_layer = Some(id);
                Some(self.host.layer_image(id)?)
            }
            RawRef::Detached => None,
        };

        self.current_image = image;
        if self.current_layer.is_none() {
            if let Some(image) = image {
                self.current_layer = self.host.layers(image)?.first().copied();
            }
        }

        Ok(true)
    }

    fn finish_item(&mut self) {
        let item = match self.current_item {
            Some(item) => item,
            None => return,
        };

        // Edit mode has no export step to resolve name collisions, so the
        // engine settles names here and pushes them to the host objects.
        if self.opts.edit_mode && self.opts.process_names && !self.opts.is_preview {
            self.uniquifier.uniquify(self.tree, item, None);
            if let Some(layer) = self.tree.item(item).raw.as_layer() {
                let name = self.tree.item(item).name.clone();
                if let Err(err) = self.host.set_layer_name(layer, &name) {
                    tracing::warn!(%err, "failed to apply item name to layer");
                }
            }
        }

        if !self.opts.keep_image_copies {
            if let Some(copy) = self.duplicated_for_item.take() {
                self.dispose_image(copy);
            }
            if let Some((loaded_item, path)) = self.loaded_for_item.take() {
                if let Some(image) = self.tree.item(loaded_item).raw.as_image() {
                    self.dispose_image(image);
                }
                self.tree.item_mut(loaded_item).raw = RawRef::File(path);
            }
        } else {
            self.duplicated_for_item = None;
            // The loaded image stays alive and the item keeps referring to
            // it.
            self.loaded_for_item = None;
        }

        self.current_item = None;
        self.current_image = None;
        self.current_layer = None;
        self.current_action_index = None;
    }

    fn dispose_image(&mut self, image: ImageId) {
        self.image_copies.retain(|&copy| copy != image);
        if self.host.is_valid_image(image) {
            if let Err(err) = self.host.remove_image(image) {
                tracing::warn!(%image, %err, "failed to dispose image copy");
            }
        }
    }

    fn into_summary(mut self, outcome: RunOutcome) -> RunSummary {
        RunSummary {
            outcome,
            matched_count: self.matched_items.len(),
            processed_count: self.processed_count,
            failed_actions: std::mem::take(&mut self.failed_actions),
            skipped_actions: std::mem::take(&mut self.skipped_actions),
            failed_conditions: std::mem::take(&mut self.failed_conditions),
            skipped_conditions: std::mem::take(&mut self.skipped_conditions),
            exported: std::mem::take(&mut self.exported),
            predicted: std::mem::take(&mut self.predicted),
        }
    }
}

struct ActionEntry {
    action: Box<dyn BuiltinAction>,
    initialized: bool,
}

/// The batch-processing pipeline engine.
pub struct Batcher<'a> {
    invoker: Invoker<RunState<'a>>,
    hooks: EntryId,
    state: RunState<'a>,
    conditions: Vec<(Command, Box<dyn BuiltinCondition>)>,
    progress: ProgressSender,
    stop: Arc<AtomicBool>,
}

impl<'a> Batcher<'a> {
    /// Set up a run over `tree` with the given command lists and settings.
    ///
    /// Fails if an enabled command names an unknown implementation;
    /// disabled unknown commands are dropped silently so stale
    /// configurations do not block unrelated processing.
    pub fn new(
        tree: &'a mut ItemTree,
        host: &'a mut dyn ImageHost,
        chooser: &'a mut dyn OverwriteChooser,
        actions: &CommandList,
        conditions: &CommandList,
        opts: BatcherOpts,
    ) -> Result<Self> {
        let mut invoker = Invoker::new();

        // The default rename step runs before everything else so that the
        // configured actions see the renamed item.
        if !opts.edit_mode && !opts.name_pattern.is_empty() {
            let command = Command::builtin("rename")
                .with_arguments(vec![Argument::new(
                    "pattern",
                    ArgValue::Str(opts.name_pattern.clone()),
                )])
                .enabled_for_previews();
            let action = actions::instantiate(&command)?
                .ok_or_else(|| Error::Internal("builtin rename not registered".into()))?;
            invoker.add(
                &[GROUP_ACTIONS, GROUP_NAME_ONLY],
                make_action_wrapper(command, action, None),
            );
        }

        // Programmatic commands added via `add_action_instance` run before
        // the configured action list, inside one removable sub-invoker.
        let hooks = invoker.add_invoker(&[GROUP_ACTIONS, GROUP_NAME_ONLY], Invoker::new());

        for (index, command) in actions.as_slice().iter().enumerate() {
            let instance = match actions::instantiate(command)? {
                Some(instance) => instance,
                None => continue,
            };
            let wrapper = make_action_wrapper(command.clone(), instance, Some(index));
            let groups: &[&str] = if actions::is_name_only(&command.orig_name) {
                &[GROUP_ACTIONS, GROUP_NAME_ONLY]
            } else {
                &[GROUP_ACTIONS]
            };
            invoker.add(groups, wrapper);
        }

        // The default export step runs last so it sees the final item
        // state.
        if !opts.edit_mode {
            let command = Command::builtin("export").enabled_for_previews();
            let action = actions::instantiate(&command)?
                .ok_or_else(|| Error::Internal("builtin export not registered".into()))?;
            invoker.add(
                &[GROUP_ACTIONS, GROUP_NAME_ONLY],
                make_action_wrapper(command, action, None),
            );
        }

        let mut condition_instances = Vec::new();
        for command in conditions {
            if let Some(instance) = conditions::instantiate(command)? {
                condition_instances.push((command.clone(), instance));
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let state = RunState {
            tree,
            host,
            chooser,
            opts,
            actions_cfg: actions.as_slice().to_vec(),
            current_item: None,
            current_image: None,
            current_layer: None,
            current_action_index: None,
            matched_items: Vec::new(),
            matched_counts: MatchedCounts::default(),
            uniquifier: ItemUniquifier::new(),
            output_paths: OutputPathResolver::new(),
            loaded_for_item: None,
            duplicated_for_item: None,
            image_copies: Vec::new(),
            processed_count: 0,
            exported: Vec::new(),
            predicted: Vec::new(),
            failed_actions: BTreeMap::new(),
            skipped_actions: BTreeMap::new(),
            failed_conditions: BTreeMap::new(),
            skipped_conditions: BTreeMap::new(),
            deferred_cleanups: Vec::new(),
            stop: Arc::clone(&stop),
        };

        Ok(Self {
            invoker,
            hooks,
            state,
            conditions: condition_instances,
            progress: ProgressSender::noop(),
            stop,
        })
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    /// A flag that cancels the run cooperatively when set. Checked between
    /// items and between action invocations.
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// The invoker driving this run, for inspection.
    pub fn invoker(&self) -> &Invoker<RunState<'a>> {
        &self.invoker
    }

    /// Register an extra action instance to run before the configured
    /// action list.
    pub fn add_action_instance(
        &mut self,
        command: Command,
        action: Box<dyn BuiltinAction>,
        name_only: bool,
    ) {
        let wrapper = make_action_wrapper(command, action, None);
        let groups: &[&str] = if name_only {
            &[GROUP_ACTIONS, GROUP_NAME_ONLY]
        } else {
            &[GROUP_ACTIONS]
        };
        let hooks = self
            .invoker
            .nested_mut(self.hooks)
            .expect("hook sub-invoker is registered in new()");
        hooks.add(groups, wrapper);
    }

    /// Register an extra condition instance, evaluated after the configured
    /// condition list.
    pub fn add_condition_instance(
        &mut self,
        command: Command,
        condition: Box<dyn BuiltinCondition>,
    ) {
        self.conditions.push((command, condition));
    }

    /// Register a callable on one of the engine's hook groups (e.g.
    /// [`GROUP_BEFORE_ITEM`]).
    pub fn add_hook(&mut self, groups: &[&str], callable: Callable<RunState<'a>>) -> EntryId {
        self.invoker.add(groups, callable)
    }

    /// Execute the run. Cleanup callbacks run exactly once before this
    /// returns, whatever the outcome.
    pub fn run(mut self) -> RunSummary {
        tracing::info!(
            preview = self.state.opts.is_preview,
            items = self.state.tree.leaf_count(),
            "starting batch run"
        );

        let result = self
            .prepare()
            .and_then(|()| self.process_items());

        if let Err(err) = self.finalize() {
            tracing::warn!(%err, "cleanup finished with an error");
        }

        let outcome = match result {
            Ok(()) => RunOutcome::Completed,
            Err(Error::Cancelled) => {
                tracing::info!("batch run canceled");
                RunOutcome::Canceled
            }
            Err(err) => {
                tracing::error!(%err, "batch run failed");
                RunOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };

        self.state.into_summary(outcome)
    }

    /// Evaluate conditions over the tree and capture the matched item set.
    fn prepare(&mut self) -> Result<()> {
        let items: Vec<ItemId> = self.state.tree.iter_items().collect();
        let mut matched = Vec::new();

        'items: for item in items {
            if self.state.is_stopped() {
                return Err(Error::Cancelled);
            }

            for (command, condition) in &mut self.conditions {
                if !self.state.command_enabled(command) {
                    continue;
                }

                let args = match resolve_args(&command.arguments, &self.state) {
                    Ok(args) => args,
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(err) => {
                        self.state
                            .record_condition_failure(command, item, err.to_string());
                        continue 'items;
                    }
                };

                let targets: Vec<ItemId> = if command.more_options.also_apply_to_parent_folders {
                    let mut chain = vec![item];
                    chain.extend(self.state.tree.parents_of(item).into_iter().rev());
                    chain
                } else {
                    vec![item]
                };

                for target in targets {
                    match condition.matches(&self.state, target, &args) {
                        Ok(true) => {}
                        Ok(false) => continue 'items,
                        Err(Error::Cancelled) => return Err(Error::Cancelled),
                        Err(Error::Skip(message)) => {
                            // A skipped condition has no say for this item.
                            self.state.record_condition_skip(command, item, message);
                            break;
                        }
                        Err(err) => {
                            self.state
                                .record_condition_failure(command, item, err.to_string());
                            continue 'items;
                        }
                    }
                }
            }

            matched.push(item);
        }

        tracing::info!(matched = matched.len(), "conditions evaluated");
        self.state.matched_counts = MatchedCounts::from_items(self.state.tree, &matched);
        self.state.matched_items = matched;
        Ok(())
    }

    fn process_items(&mut self) -> Result<()> {
        self.invoke_group(GROUP_BEFORE_ITEMS)?;

        let items = self.state.matched_items.clone();
        let total = items.len();

        for (position, item) in items.into_iter().enumerate() {
            if self.state.is_stopped() {
                return Err(Error::Cancelled);
            }

            let name = self.state.tree.item(item).name.clone();
            tracing::debug!(item = %name, "processing item");

            match self.process_item(item) {
                Ok(processed) => {
                    if processed {
                        self.state.processed_count += 1;
                    }
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(Error::Action { .. })
                    if self.state.opts.failure_policy == FailurePolicy::ContinueWithNextItem =>
                {
                    // Already recorded at the invocation boundary; the
                    // item's remaining actions are skipped.
                }
                Err(err) => return Err(err),
            }

            self.progress.send(position + 1, total, &name);
        }

        self.invoke_group(GROUP_AFTER_ITEMS)
    }

    fn process_item(&mut self, item: ItemId) -> Result<bool> {
        if !self.state.begin_item(item)? {
            return Ok(false);
        }
        let result = self.run_item_groups();
        self.state.finish_item();
        self.drain_cleanups();
        result.map(|()| true)
    }

    fn run_item_groups(&mut self) -> Result<()> {
        self.invoke_group(GROUP_BEFORE_ITEM)?;

        if self.state.opts.is_preview && self.state.opts.process_names {
            self.invoke_group(GROUP_NAME_ONLY)?;
        }
        if self.state.opts.process_contents {
            self.invoke_group(GROUP_ACTIONS)?;
        }

        self.invoke_group(GROUP_AFTER_ITEM)
    }

    fn invoke_group(&mut self, group: &str) -> Result<()> {
        let result = self.invoker.invoke(group, &mut self.state);
        self.drain_cleanups();
        result
    }

    fn drain_cleanups(&mut self) {
        for callable in std::mem::take(&mut self.state.deferred_cleanups) {
            self.invoker.add(&[GROUP_CLEANUP], callable);
        }
    }

    fn finalize(&mut self) -> Result<()> {
        self.drain_cleanups();
        let result = self.invoker.invoke(GROUP_CLEANUP, &mut self.state);

        if !self.state.opts.keep_image_copies {
            for image in std::mem::take(&mut self.state.image_copies) {
                if self.state.host.is_valid_image(image) {
                    if let Err(err) = self.state.host.remove_image(image) {
                        tracing::warn!(%image, %err, "failed to dispose image copy");
                    }
                }
            }
        }

        result
    }
}

/// Wrap an action instance into an invoker callable applying the engine's
/// per-invocation protocol: cancellation check, enabled check, placeholder
/// substitution, and skip/failure recording.
fn make_action_wrapper<'a>(
    command: Command,
    action: Box<dyn BuiltinAction>,
    index: Option<usize>,
) -> Callable<RunState<'a>> {
    let entry = Rc::new(RefCell::new(ActionEntry {
        action,
        initialized: false,
    }));

    Box::new(move |state: &mut RunState<'a>| {
        if state.is_stopped() {
            return Err(Error::Cancelled);
        }
        if !state.command_enabled(&command) {
            return Ok(());
        }

        state.current_action_index = index;

        let result = (|| {
            let args = resolve_args(&command.arguments, state)?;
            let mut entry = entry.borrow_mut();
            if !entry.initialized {
                entry.action.init(state)?;
                entry.initialized = true;
            }
            entry.action.step(state, &args)
        })();

        match result {
            Ok(()) => Ok(()),
            Err(Error::Skip(message)) => {
                state.record_action_skip(&command, message);
                Ok(())
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(err) => {
                let item = state.current_item_name().unwrap_or_default();
                let message = err.to_string();
                state.record_action_failure(&command, message.clone());
                Err(Error::action(&command.name, item, message))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use pb_core::{ColorTag, OverwriteMode};

    use crate::actions::BuiltinAction;
    use crate::conditions::BuiltinCondition;
    use crate::overwrite::NoninteractiveOverwriteChooser;
    use crate::placeholders::ResolvedArgs;
    use crate::test_host::FakeHost;

    // -- Helpers --------------------------------------------------------------

    fn rename_command(pattern: &str) -> Command {
        Command::builtin("rename")
            .with_arguments(vec![Argument::new(
                "pattern",
                ArgValue::Str(pattern.into()),
            )])
            .enabled_for_previews()
    }

    fn file_tree(names: &[&str]) -> ItemTree {
        let mut tree = ItemTree::new();
        for name in names {
            tree.add_leaf(
                *name,
                RawRef::File(PathBuf::from(format!("/input/{name}"))),
                None,
            )
            .unwrap();
        }
        tree
    }

    fn opts_with_output(directory: &Path) -> BatcherOpts {
        BatcherOpts {
            output_directory: directory.to_path_buf(),
            ..BatcherOpts::default()
        }
    }

    fn item_names(tree: &ItemTree) -> Vec<String> {
        tree.iter_items()
            .map(|id| tree.item(id).name.clone())
            .collect()
    }

    fn exported_file_names(host: &FakeHost) -> Vec<String> {
        host.exports
            .iter()
            .map(|(_, path)| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    // -- Fake actions and conditions ------------------------------------------

    /// Logs each processed item; optionally errors or cancels on a given
    /// item name.
    struct Spy {
        label: &'static str,
        log: Rc<RefCell<Vec<String>>>,
        fail_on: Option<&'static str>,
        cancel_on: Option<&'static str>,
    }

    impl Spy {
        fn new(label: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                label,
                log: Rc::clone(log),
                fail_on: None,
                cancel_on: None,
            }
        }
    }

    impl BuiltinAction for Spy {
        fn name(&self) -> &'static str {
            self.label
        }

        fn step(&mut self, state: &mut RunState<'_>, _args: &ResolvedArgs) -> Result<()> {
            let item = state.require_current_item()?;
            let name = state.tree().item(item).name.clone();
            self.log.borrow_mut().push(format!("{}:{}", self.label, name));
            if self.fail_on == Some(name.as_str()) {
                return Err(Error::Internal("intentional failure".into()));
            }
            if self.cancel_on == Some(name.as_str()) {
                return Err(Error::Cancelled);
            }
            Ok(())
        }
    }

    /// Registers a cleanup callback once, from `init`.
    struct CleanupProbe {
        runs: Rc<RefCell<usize>>,
    }

    impl BuiltinAction for CleanupProbe {
        fn name(&self) -> &'static str {
            "cleanup_probe"
        }

        fn init(&mut self, state: &mut RunState<'_>) -> Result<()> {
            let runs = Rc::clone(&self.runs);
            state.register_cleanup(Box::new(move |_state| {
                *runs.borrow_mut() += 1;
                Ok(())
            }));
            Ok(())
        }

        fn step(&mut self, _state: &mut RunState<'_>, _args: &ResolvedArgs) -> Result<()> {
            Ok(())
        }
    }

    /// Stateful condition keeping every other item, starting with the
    /// first.
    struct EveryOther {
        keep: bool,
    }

    impl BuiltinCondition for EveryOther {
        fn name(&self) -> &'static str {
            "every_other"
        }

        fn matches(
            &mut self,
            _state: &RunState<'_>,
            _item: pb_tree::ItemId,
            _args: &ResolvedArgs,
        ) -> Result<bool> {
            self.keep = !self.keep;
            Ok(self.keep)
        }
    }

    // -- Tests ----------------------------------------------------------------

    #[test]
    fn programmatic_actions_run_before_configured_ones() {
        let out = tempfile::tempdir().unwrap();
        let mut tree = file_tree(&["a"]);
        let mut host = FakeHost::new();
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);
        let actions = CommandList::from(vec![rename_command("renamed")]);
        let conditions = CommandList::new();

        let mut batcher = Batcher::new(
            &mut tree,
            &mut host,
            &mut chooser,
            &actions,
            &conditions,
            opts_with_output(out.path()),
        )
        .unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        batcher.add_action_instance(
            Command::builtin("spy"),
            Box::new(Spy::new("spy", &log)),
            false,
        );

        let summary = batcher.run();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        // The spy saw the item before the configured rename touched it.
        assert_eq!(*log.borrow(), ["spy:a"]);
        assert_eq!(item_names(&tree), ["renamed"]);
        assert_eq!(exported_file_names(&host), ["renamed.png"]);
    }

    #[test]
    fn failure_for_one_item_leaves_the_others_processed() {
        let out = tempfile::tempdir().unwrap();
        let mut tree = file_tree(&["a", "b", "c"]);
        let mut host = FakeHost::new();
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);
        let actions = CommandList::new();
        let conditions = CommandList::new();

        let mut batcher = Batcher::new(
            &mut tree,
            &mut host,
            &mut chooser,
            &actions,
            &conditions,
            opts_with_output(out.path()),
        )
        .unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut spy = Spy::new("spy", &log);
        spy.fail_on = Some("b");
        batcher.add_action_instance(Command::builtin("spy"), Box::new(spy), false);

        let summary = batcher.run();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.matched_count, 3);
        assert_eq!(summary.processed_count, 2);
        // Exactly one failure, keyed by the failing command, naming item
        // "b".
        assert_eq!(summary.failed_actions.len(), 1);
        let failures = &summary.failed_actions["spy"];
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].item.as_deref(), Some("b"));
        // Items "a" and "c" ran to the end, including their export.
        assert_eq!(exported_file_names(&host), ["a.png", "c.png"]);
    }

    #[test]
    fn abort_policy_stops_at_the_first_failure() {
        let out = tempfile::tempdir().unwrap();
        let mut tree = file_tree(&["a", "b", "c"]);
        let mut host = FakeHost::new();
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);
        let actions = CommandList::new();
        let conditions = CommandList::new();
        let opts = BatcherOpts {
            failure_policy: FailurePolicy::Abort,
            ..opts_with_output(out.path())
        };

        let mut batcher =
            Batcher::new(&mut tree, &mut host, &mut chooser, &actions, &conditions, opts).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut spy = Spy::new("spy", &log);
        spy.fail_on = Some("b");
        batcher.add_action_instance(Command::builtin("spy"), Box::new(spy), false);

        let summary = batcher.run();

        assert!(matches!(summary.outcome, RunOutcome::Failed { .. }));
        assert_eq!(exported_file_names(&host), ["a.png"]);
    }

    #[test]
    fn cancellation_stops_processing_but_cleanup_still_runs_once() {
        let out = tempfile::tempdir().unwrap();
        let mut tree = file_tree(&["a", "b", "c"]);
        let mut host = FakeHost::new();
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);
        let actions = CommandList::new();
        let conditions = CommandList::new();

        let mut batcher = Batcher::new(
            &mut tree,
            &mut host,
            &mut chooser,
            &actions,
            &conditions,
            opts_with_output(out.path()),
        )
        .unwrap();

        let cleanup_runs = Rc::new(RefCell::new(0));
        batcher.add_action_instance(
            Command::builtin("cleanup_probe"),
            Box::new(CleanupProbe {
                runs: Rc::clone(&cleanup_runs),
            }),
            false,
        );

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut spy = Spy::new("spy", &log);
        spy.cancel_on = Some("b");
        batcher.add_action_instance(Command::builtin("spy"), Box::new(spy), false);

        let summary = batcher.run();

        assert_eq!(summary.outcome, RunOutcome::Canceled);
        // Item "c" was never reached; cancellation is not a failure.
        assert_eq!(*log.borrow(), ["spy:a", "spy:b"]);
        assert!(summary.failed_actions.is_empty());
        assert_eq!(*cleanup_runs.borrow(), 1);
        assert_eq!(exported_file_names(&host), ["a.png"]);
    }

    #[test]
    fn stop_signal_cancels_between_items() {
        let out = tempfile::tempdir().unwrap();
        let mut tree = file_tree(&["a", "b", "c"]);
        let mut host = FakeHost::new();
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);
        let actions = CommandList::new();
        let conditions = CommandList::new();

        let mut batcher = Batcher::new(
            &mut tree,
            &mut host,
            &mut chooser,
            &actions,
            &conditions,
            opts_with_output(out.path()),
        )
        .unwrap();

        let stop = batcher.stop_signal();
        batcher.add_hook(
            &[GROUP_AFTER_ITEM],
            Box::new(move |_state| {
                stop.store(true, Ordering::Relaxed);
                Ok(())
            }),
        );

        let summary = batcher.run();

        assert_eq!(summary.outcome, RunOutcome::Canceled);
        assert_eq!(exported_file_names(&host), ["a.png"]);
    }

    #[test]
    fn duplicate_names_are_renamed_then_uniquified_in_order() {
        let out = tempfile::tempdir().unwrap();
        let mut tree = file_tree(&["A", "B", "B"]);
        let mut host = FakeHost::new();
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);
        let actions = CommandList::from(vec![rename_command("X")]);
        let conditions = CommandList::from(vec![Command::builtin("always")]);

        let mut batcher = Batcher::new(
            &mut tree,
            &mut host,
            &mut chooser,
            &actions,
            &conditions,
            opts_with_output(out.path()),
        )
        .unwrap();
        let summary = batcher.run();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(item_names(&tree), ["X", "X (1)", "X (2)"]);
        assert_eq!(
            exported_file_names(&host),
            ["X.png", "X (1).png", "X (2).png"]
        );
    }

    #[test]
    fn preview_and_full_run_compute_identical_names() {
        let out = tempfile::tempdir().unwrap();

        let preview_opts = BatcherOpts {
            name_pattern: "image[001]".into(),
            output_directory: out.path().to_path_buf(),
            ..BatcherOpts::preview()
        };
        let mut preview_tree = file_tree(&["photo1.png", "photo2.png"]);
        let mut preview_host = FakeHost::new();
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);
        let batcher = Batcher::new(
            &mut preview_tree,
            &mut preview_host,
            &mut chooser,
            &CommandList::new(),
            &CommandList::new(),
            preview_opts,
        )
        .unwrap();
        let preview_summary = batcher.run();

        assert_eq!(preview_summary.outcome, RunOutcome::Completed);
        // A name-only pass never touches item contents.
        assert!(preview_host.exports.is_empty());
        let predicted: Vec<String> = preview_summary
            .predicted
            .iter()
            .map(|(_, path)| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(predicted, ["image001.png", "image002.png"]);

        let full_opts = BatcherOpts {
            name_pattern: "image[001]".into(),
            ..opts_with_output(out.path())
        };
        let mut full_tree = file_tree(&["photo1.png", "photo2.png"]);
        let mut full_host = FakeHost::new();
        let mut full_chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);
        let batcher = Batcher::new(
            &mut full_tree,
            &mut full_host,
            &mut full_chooser,
            &CommandList::new(),
            &CommandList::new(),
            full_opts,
        )
        .unwrap();
        let full_summary = batcher.run();

        assert_eq!(full_summary.outcome, RunOutcome::Completed);
        assert_eq!(exported_file_names(&full_host), predicted.as_slice());
        assert_eq!(item_names(&preview_tree), item_names(&full_tree));
    }

    #[test]
    fn conditions_filter_items_in_full_runs() {
        let out = tempfile::tempdir().unwrap();
        let mut tree = file_tree(&["a.png", "b.jpg"]);
        let mut host = FakeHost::new();
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);
        let actions = CommandList::new();
        let conditions = CommandList::from(vec![Command::builtin("matching_file_extension")]);

        let batcher = Batcher::new(
            &mut tree,
            &mut host,
            &mut chooser,
            &actions,
            &conditions,
            opts_with_output(out.path()),
        )
        .unwrap();
        let summary = batcher.run();

        assert_eq!(summary.matched_count, 1);
        assert_eq!(exported_file_names(&host), ["a.png"]);
    }

    #[test]
    fn conditions_not_enabled_for_previews_do_not_filter_previews() {
        let mut tree = file_tree(&["a.png", "b.jpg"]);
        let mut host = FakeHost::new();
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);
        let actions = CommandList::new();
        let conditions = CommandList::from(vec![Command::builtin("matching_file_extension")]);

        let batcher = Batcher::new(
            &mut tree,
            &mut host,
            &mut chooser,
            &actions,
            &conditions,
            BatcherOpts::preview(),
        )
        .unwrap();
        let summary = batcher.run();

        // The unfiltered view: skipped items still show up in a name-only
        // preview when the condition does not opt into previews.
        assert_eq!(summary.matched_count, 2);
    }

    #[test]
    fn stateful_conditions_see_every_item_in_order() {
        let out = tempfile::tempdir().unwrap();
        let mut tree = file_tree(&["a", "b", "c", "d"]);
        let mut host = FakeHost::new();
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);

        let mut batcher = Batcher::new(
            &mut tree,
            &mut host,
            &mut chooser,
            &CommandList::new(),
            &CommandList::new(),
            opts_with_output(out.path()),
        )
        .unwrap();
        batcher.add_condition_instance(
            Command::builtin("every_other"),
            Box::new(EveryOther { keep: false }),
        );

        let summary = batcher.run();

        assert_eq!(summary.matched_count, 2);
        assert_eq!(exported_file_names(&host), ["a.png", "c.png"]);
    }

    #[test]
    fn insert_and_merge_background_by_color_tag() {
        let out = tempfile::tempdir().unwrap();
        let mut host = FakeHost::new();
        let tagged = host.add_image(&[("main", ColorTag::None), ("bg", ColorTag::Blue)]);
        let untagged = host.add_image(&[("solo", ColorTag::None)]);

        let mut tree = ItemTree::new();
        tree.add_leaf("main", RawRef::Image(tagged), None).unwrap();
        tree.add_leaf("solo", RawRef::Image(untagged), None).unwrap();

        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);
        let actions = CommandList::from(vec![
            Command::builtin("insert_background").with_arguments(vec![Argument::new(
                "color_tag",
                ArgValue::ColorTag(ColorTag::Blue),
            )]),
            Command::builtin("merge_background"),
        ]);
        let opts = BatcherOpts {
            edit_mode: true,
            ..opts_with_output(out.path())
        };

        let batcher = Batcher::new(
            &mut tree,
            &mut host,
            &mut chooser,
            &actions,
            &CommandList::new(),
            opts,
        )
        .unwrap();
        let summary = batcher.run();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert!(summary.failed_actions.is_empty());

        // The tagged image gained a copy of "bg" behind "main", which the
        // merge folded back into a single layer keeping the current name.
        let layers = host.image(tagged).layers.clone();
        assert_eq!(layers.len(), 2);
        assert_eq!(host.layer(layers[0]).name, "main");
        assert_eq!(host.layer(layers[1]).name, "bg");

        // The untagged image had nothing to insert; the merge recorded a
        // skip instead of failing.
        assert_eq!(host.image(untagged).layers.len(), 1);
        let skips = &summary.skipped_actions["merge_background"];
        assert_eq!(skips.len(), 1);
        assert_eq!(skips[0].item.as_deref(), Some("solo"));
    }

    #[test]
    fn load_failure_fails_the_run_unless_opted_out() {
        let out = tempfile::tempdir().unwrap();

        let mut tree = file_tree(&["ok.png", "gone.png"]);
        let mut host = FakeHost::new();
        host.missing_files.push(PathBuf::from("/input/gone.png"));
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);

        let batcher = Batcher::new(
            &mut tree,
            &mut host,
            &mut chooser,
            &CommandList::new(),
            &CommandList::new(),
            opts_with_output(out.path()),
        )
        .unwrap();
        let summary = batcher.run();
        assert!(matches!(summary.outcome, RunOutcome::Failed { .. }));
        assert_eq!(exported_file_names(&host), ["ok.png"]);

        let mut tree = file_tree(&["ok.png", "gone.png"]);
        let mut host = FakeHost::new();
        host.missing_files.push(PathBuf::from("/input/gone.png"));
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);
        let opts = BatcherOpts {
            continue_on_load_error: true,
            ..opts_with_output(out.path())
        };

        let batcher = Batcher::new(
            &mut tree,
            &mut host,
            &mut chooser,
            &CommandList::new(),
            &CommandList::new(),
            opts,
        )
        .unwrap();
        let summary = batcher.run();
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert!(summary.failed_actions.is_empty());
    }

    #[test]
    fn overwrite_skip_is_recorded_not_failed() {
        let out = tempfile::tempdir().unwrap();
        std::fs::write(out.path().join("a.png"), b"existing").unwrap();

        let mut tree = file_tree(&["a"]);
        let mut host = FakeHost::new();
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::Skip);

        let batcher = Batcher::new(
            &mut tree,
            &mut host,
            &mut chooser,
            &CommandList::new(),
            &CommandList::new(),
            opts_with_output(out.path()),
        )
        .unwrap();
        let summary = batcher.run();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert!(summary.failed_actions.is_empty());
        assert_eq!(summary.skipped_actions["export"].len(), 1);
        assert!(host.exports.is_empty());
    }

    #[test]
    fn image_copies_are_disposed_at_the_end() {
        let out = tempfile::tempdir().unwrap();
        let mut tree = file_tree(&["a", "b"]);
        let mut host = FakeHost::new();
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);

        let batcher = Batcher::new(
            &mut tree,
            &mut host,
            &mut chooser,
            &CommandList::new(),
            &CommandList::new(),
            opts_with_output(out.path()),
        )
        .unwrap();
        let summary = batcher.run();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        // One image loaded and disposed per item.
        assert_eq!(host.removed_images.len(), 2);
        // The tree's raw references point back at the input files.
        for id in tree.iter_items().collect::<Vec<_>>() {
            assert!(tree.item(id).raw.as_file().is_some());
        }
    }
}
