use crate::il::{FieldId, Function, FunctionId, MethodRef};
use crate::Error;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A field declared by some class of the program.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Field {
    id: FieldId,
    class: String,
    name: String,
}

impl Field {
    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An ordered collection of functions, together with the override hierarchy
/// used to resolve virtual dispatch and the program's declared fields.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Program {
    // Functions in the order they were added; a `FunctionId` is an index
    // into this map.
    functions: BTreeMap<usize, Function>,
    // Qualified name -> function id, for call-site resolution.
    by_qualified_name: FxHashMap<String, FunctionId>,
    // Base function id -> the ids of the functions overriding it.
    overrides: FxHashMap<FunctionId, Vec<FunctionId>>,
    // Declared fields; a `FieldId` is an index into this vec.
    fields: Vec<Field>,
}

impl Program {
    pub fn new() -> Program {
        Program::default()
    }

    /// Add a function to the program, assigning its id. Errors if a function
    /// with the same qualified name already exists.
    pub fn add_function(&mut self, mut function: Function) -> Result<FunctionId, Error> {
        let qualified = function.qualified_name();
        if self.by_qualified_name.contains_key(&qualified) {
            return Err(Error::Custom(format!(
                "duplicate function name {}",
                qualified
            )));
        }
        let id = FunctionId(self.functions.len());
        function.set_id(id);
        self.functions.insert(id.0, function);
        self.by_qualified_name.insert(qualified, id);
        Ok(id)
    }

    /// Declare a field, assigning its id.
    pub fn add_field<C: Into<String>, N: Into<String>>(&mut self, class: C, name: N) -> FieldId {
        let id = FieldId(self.fields.len());
        self.fields.push(Field {
            id,
            class: class.into(),
            name: name.into(),
        });
        id
    }

    /// Record that `overriding` overrides `base`. Both must already belong to
    /// the program.
    pub fn add_override(
        &mut self,
        base: FunctionId,
        overriding: FunctionId,
    ) -> Result<(), Error> {
        if !self.functions.contains_key(&base.0) {
            return Err(Error::Custom(format!("function {} does not exist", base)));
        }
        if !self.functions.contains_key(&overriding.0) {
            return Err(Error::Custom(format!(
                "function {} does not exist",
                overriding
            )));
        }
        self.overrides.entry(base).or_default().push(overriding);
        Ok(())
    }

    /// Get a function by id.
    pub fn function(&self, id: FunctionId) -> Result<&Function, Error> {
        self.functions
            .get(&id.0)
            .ok_or_else(|| Error::Custom(format!("function {} does not exist", id)))
    }

    /// Every function in the program, in id order.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    /// Resolve a symbolic method reference to the function it names, if it is
    /// part of this program.
    pub fn resolve(&self, method: &MethodRef) -> Option<FunctionId> {
        self.by_qualified_name.get(&method.qualified()).copied()
    }

    /// The functions overriding `base`, not including `base` itself.
    pub fn overrides_of(&self, base: FunctionId) -> &[FunctionId] {
        self.overrides
            .get(&base)
            .map(|overrides| overrides.as_slice())
            .unwrap_or(&[])
    }

    pub fn field(&self, id: FieldId) -> Result<&Field, Error> {
        self.fields
            .get(id.0)
            .ok_or_else(|| Error::Custom(format!("{} does not exist", id)))
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for function in self.functions.values() {
            writeln!(f, "{}", function)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::ControlFlowGraph;

    fn empty_function(class: &str, name: &str) -> Function {
        let mut cfg = ControlFlowGraph::new();
        let block = cfg.new_block().unwrap();
        block.ret_void();
        let entry = block.index();
        cfg.set_entry(entry).unwrap();
        Function::new(class, name, 0, true, cfg)
    }

    #[test]
    fn resolve_by_qualified_name() {
        let mut program = Program::new();
        let id = program.add_function(empty_function("Udf", "eval")).unwrap();
        assert_eq!(program.resolve(&MethodRef::new("Udf", "eval")), Some(id));
        assert_eq!(program.resolve(&MethodRef::new("Udf", "other")), None);
    }

    #[test]
    fn duplicate_function_names_are_rejected() {
        let mut program = Program::new();
        program.add_function(empty_function("Udf", "eval")).unwrap();
        assert!(program.add_function(empty_function("Udf", "eval")).is_err());
    }

    #[test]
    fn overrides_are_recorded() {
        let mut program = Program::new();
        let base = program.add_function(empty_function("Base", "run")).unwrap();
        let sub = program.add_function(empty_function("Sub", "run")).unwrap();
        program.add_override(base, sub).unwrap();
        assert_eq!(program.overrides_of(base), &[sub]);
        assert!(program.overrides_of(sub).is_empty());
    }
}
