//! Entry point discovery and invocation

use std::sync::Arc;

use thiserror::Error;

use crate::compiler::unit::{CompiledUnit, MethodId, MethodSignature, TemplateType, Ty};
use crate::document::Document;
use crate::runtime::{LogSink, Machine, RuntimeError, Value};

/// The compiled template does not have the shape the renderer can call
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntryPointError {
    #[error("template declares no top-level class")]
    NoTopLevelType,

    #[error(
        "template declares {} top-level classes ({}); exactly one is required",
        .names.len(),
        .names.join(", ")
    )]
    MultipleTopLevelTypes { names: Vec<String> },

    #[error(
        "class '{type_name}' has no static method taking (document: Document, log: fn(int, string, any)) with an optional third string parameter"
    )]
    NoEntryPoint { type_name: String },

    #[error("class '{type_name}' has more than one entry point: {}", .candidates.join("; "))]
    AmbiguousEntryPoint {
        type_name: String,
        candidates: Vec<String>,
    },
}

/// How many arguments the entry point takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// `(document, log)`
    Two,
    /// `(document, log, template_dir)`
    Three,
}

impl Arity {
    pub fn count(self) -> usize {
        match self {
            Arity::Two => 2,
            Arity::Three => 3,
        }
    }
}

fn arity_of(signature: &MethodSignature) -> Option<Arity> {
    if !signature.is_static {
        return None;
    }
    let types: Vec<&Ty> = signature.params.iter().map(|(_, ty)| ty).collect();
    match types.as_slice() {
        [Ty::Document, log] if **log == Ty::log_callback() => Some(Arity::Two),
        [Ty::Document, log, Ty::String] if **log == Ty::log_callback() => Some(Arity::Three),
        _ => None,
    }
}

/// The resolved fill method of a template
#[derive(Debug, Clone)]
pub struct EntryPoint {
    unit: Arc<CompiledUnit>,
    method: MethodId,
    arity: Arity,
}

impl EntryPoint {
    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn signature(&self) -> &MethodSignature {
        self.unit.signature(self.method)
    }

    /// Qualified `Type.method` name
    pub fn name(&self) -> String {
        self.unit.qualified_name(self.method)
    }

    /// Run the template; `template_dir` is only passed to three-argument entry points
    pub fn invoke(
        &self,
        document: &mut dyn Document,
        log: &mut LogSink<'_>,
        template_dir: &str,
    ) -> Result<(), RuntimeError> {
        let mut args = vec![Value::Document, Value::Log];
        if self.arity == Arity::Three {
            args.push(Value::Str(template_dir.to_string()));
        }
        tracing::debug!(entry = %self.name(), arity = self.arity.count(), "invoking template");
        Machine::new(&self.unit, document, log).invoke(self.method, args)?;
        Ok(())
    }
}

impl TemplateType {
    /// Find the single static method the renderer can call
    pub fn entry_point(&self) -> Result<EntryPoint, EntryPointError> {
        let matches: Vec<(MethodId, Arity)> = self
            .methods()
            .filter_map(|(id, signature)| arity_of(signature).map(|arity| (id, arity)))
            .collect();

        match matches.as_slice() {
            [] => Err(EntryPointError::NoEntryPoint {
                type_name: self.name().to_string(),
            }),
            [(method, arity)] => Ok(EntryPoint {
                unit: Arc::clone(&self.unit),
                method: *method,
                arity: *arity,
            }),
            _ => Err(EntryPointError::AmbiguousEntryPoint {
                type_name: self.name().to_string(),
                candidates: matches
                    .iter()
                    .map(|(id, _)| self.unit.signature(*id).to_string())
                    .collect(),
            }),
        }
    }
}
