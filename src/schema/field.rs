//! Field descriptors, default values, and validators.

use std::{fmt, sync::Arc};

use crate::types::{FieldType, Value};

/// Check run against a field value before any storage call.
#[derive(Clone)]
pub struct Validator {
    name: String,
    check: Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>,
}

impl Validator {
    /// Wraps a closure returning a human-readable cause on failure.
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Name reported in validation failures.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the check against one value.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        (self.check)(value)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Validator").field(&self.name).finish()
    }
}

/// How a missing field gets a value on create.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A fixed value declared in the schema.
    Static(Value),
    /// A generator registered on the registry under the field's key.
    Provider,
}

/// Schema of one stored field. The field name doubles as the column name.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Column name.
    pub name: String,
    /// Storage type.
    pub ty: FieldType,
    /// Column accepts NULL and the field may be cleared.
    pub optional: bool,
    /// Field may only be written on create.
    pub immutable: bool,
    /// Whether the column carries a UNIQUE constraint.
    pub unique: bool,
    /// Default applied on create when the field is unset.
    pub default: Option<DefaultValue>,
    /// Updates fill the field from a registered update provider when unset.
    pub update_default: bool,
    /// Checks run on every assigned value.
    pub validators: Vec<Validator>,
}

impl FieldDescriptor {
    /// A required, mutable, non-unique field.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
            immutable: false,
            unique: false,
            default: None,
            update_default: false,
            validators: Vec::new(),
        }
    }

    /// A string field.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    /// An integer field.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Int)
    }

    /// A float field.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }

    /// A boolean field.
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Bool)
    }

    /// A millisecond timestamp field.
    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Time)
    }

    /// A JSON field.
    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Json)
    }

    /// Allows NULL and makes the field optional on create.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Rejects changes after create.
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Adds a UNIQUE constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Uses `value` when the field is unset on create.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Static(value.into()));
        self
    }

    /// Fills the field on create from the registry provider for this field.
    pub fn default_provider(mut self) -> Self {
        self.default = Some(DefaultValue::Provider);
        self
    }

    /// Fills the field on update from the registry update provider.
    pub fn update_provider(mut self) -> Self {
        self.update_default = true;
        self
    }

    /// Adds a validator.
    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Required on create: not optional and no way to default it.
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }

    /// Runs the type check and every validator.
    pub fn check_value(&self, label: &str, value: &Value) -> Result<(), String> {
        if value.is_null() {
            if self.optional {
                return Ok(());
            }
            return Err(format!("field \"{label}.{}\" cannot be null", self.name));
        }
        if !value.matches(self.ty) {
            return Err(format!(
                "field \"{label}.{}\" expects {}, got {value}",
                self.name, self.ty
            ));
        }
        for validator in &self.validators {
            validator.check(value).map_err(|cause| {
                format!("validator failed for field \"{label}.{}\": {cause}", self.name)
            })?;
        }
        Ok(())
    }
}
