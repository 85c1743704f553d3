use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::{json, Value};

use crate::datastore::Datastore;
use crate::document::DatasetSnapshot;
use crate::error::DatastoreError;

/// Transformation function applied to the values of one or more columns of a
/// single row. Receives one value per input column and returns the new value
/// for the first of them.
pub type CommandFunction = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// A registered transformation command: the function value plus the metadata
/// a front-end needs to list and invoke it.
#[derive(Clone)]
pub struct CommandSpec {
    pub name: String,
    pub namespace: Option<String>,
    pub label: Option<String>,
    pub help: Option<String>,
    /// Number of input columns the function operates on.
    pub arity: usize,
    func: CommandFunction,
}

impl CommandSpec {
    pub fn new<F>(name: &str, arity: usize, func: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        CommandSpec {
            name: name.to_string(),
            namespace: None,
            label: None,
            help: None,
            arity,
            func: Arc::new(func),
        }
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_help(mut self, help: &str) -> Self {
        self.help = Some(help.to_string());
        self
    }

    fn to_dict(&self) -> Value {
        json!({
            "name": self.name,
            "label": self.label,
            "help": self.help,
            "columns": self.arity,
        })
    }
}

fn string_command<F>(func: F) -> impl Fn(&[Value]) -> Value
where
    F: Fn(&str) -> String,
{
    // Non-string cells pass through unchanged.
    move |values: &[Value]| match values[0].as_str() {
        Some(text) => Value::String(func(text)),
        None => values[0].clone(),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Registry for transformation commands that can be applied to a dataset.
///
/// Commands are plain function values dispatched by map lookup. The default
/// registry ships the demonstration string commands.
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, CommandSpec>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        let seeds = [
            CommandSpec::new("to_lower", 1, string_command(|text| text.to_lowercase())),
            CommandSpec::new("to_upper", 1, string_command(|text| text.to_uppercase())),
            CommandSpec::new("capitalize", 1, string_command(capitalize)),
        ];
        let mut commands = HashMap::new();
        for spec in seeds {
            commands.insert(spec.name.clone(), spec);
        }
        CommandRegistry {
            commands: RwLock::new(commands),
        }
    }
}

impl CommandRegistry {
    /// An empty registry with no commands.
    pub fn new() -> Self {
        CommandRegistry {
            commands: RwLock::new(HashMap::new()),
        }
    }

    /// Add a command, replacing any previous registration under the same name.
    pub fn register(&self, spec: CommandSpec) -> Result<(), DatastoreError> {
        let mut commands = self
            .commands
            .write()
            .map_err(|_| DatastoreError::LockPoisoned("command registry"))?;
        commands.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Option<CommandSpec>, DatastoreError> {
        let commands = self
            .commands
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("command registry"))?;
        Ok(commands.get(name).cloned())
    }

    /// Serialization of all registered commands, grouped by namespace, for
    /// display in a front-end.
    pub fn serialize(&self) -> Result<Value, DatastoreError> {
        let commands = self
            .commands
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("command registry"))?;
        let mut grouped: HashMap<String, Vec<&CommandSpec>> = HashMap::new();
        for spec in commands.values() {
            grouped
                .entry(spec.namespace.clone().unwrap_or_default())
                .or_default()
                .push(spec);
        }
        let mut namespaces: Vec<String> = grouped.keys().cloned().collect();
        namespaces.sort();
        let doc: Vec<Value> = namespaces
            .into_iter()
            .map(|namespace| {
                let mut specs = grouped.remove(&namespace).unwrap_or_default();
                specs.sort_by(|a, b| a.name.cmp(&b.name));
                json!({
                    "namespace": namespace,
                    "functions": specs.iter().map(|s| s.to_dict()).collect::<Vec<_>>(),
                })
            })
            .collect();
        Ok(json!(doc))
    }
}

/// Handle through which registered commands execute against one dataset.
///
/// Every invocation checks out the latest snapshot, applies the function
/// row-wise, and commits the result as exactly one new version with a
/// provenance action describing the mutation.
pub struct DatasetOperations<'a, D: Datastore> {
    store: &'a D,
    registry: &'a CommandRegistry,
    name: &'a str,
}

impl<'a, D: Datastore> DatasetOperations<'a, D> {
    pub(crate) fn new(store: &'a D, registry: &'a CommandRegistry, name: &'a str) -> Self {
        DatasetOperations {
            store,
            registry,
            name,
        }
    }

    /// Apply a registered command to the given columns of the latest snapshot.
    /// The result is written to the first named column.
    pub fn update(
        &self,
        columns: &[&str],
        command: &str,
    ) -> Result<DatasetSnapshot, DatastoreError> {
        let spec = self.registry.get(command)?.ok_or_else(|| {
            DatastoreError::InvalidArgument(format!("unknown command '{}'", command))
        })?;
        if columns.len() != spec.arity {
            return Err(DatastoreError::InvalidArgument(format!(
                "command '{}' takes {} column(s), got {}",
                command,
                spec.arity,
                columns.len()
            )));
        }
        let func = spec.func.clone();
        self.update_with(columns, command, move |values| func(values))
    }

    /// Apply an ad-hoc function the same way `update` applies a registered
    /// command. `description` goes into the provenance action.
    pub fn update_with<F>(
        &self,
        columns: &[&str],
        description: &str,
        func: F,
    ) -> Result<DatasetSnapshot, DatastoreError>
    where
        F: Fn(&[Value]) -> Value,
    {
        if columns.is_empty() {
            return Err(DatastoreError::InvalidArgument(
                "no columns given".to_string(),
            ));
        }
        let snapshot = self.store.checkout(self.name, None)?;
        let mut document = snapshot.document;
        let mut indexes = Vec::with_capacity(columns.len());
        for column in columns {
            let index = document.column_index(column).ok_or_else(|| {
                DatastoreError::InvalidArgument(format!("unknown column '{}'", column))
            })?;
            indexes.push(index);
        }
        let target = indexes[0];
        for row in &mut document.rows {
            let inputs: Vec<Value> = indexes.iter().map(|i| row.values[*i].clone()).collect();
            row.values[target] = func(&inputs);
        }
        let action = json!({
            "command": description,
            "columns": columns,
        });
        self.store.commit(document, self.name, Some(action))
    }
}
