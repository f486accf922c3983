//! Functions, basic blocks, and pipeline-stage metadata.

use shade_diag::Span;

use crate::arena::{Arena, Handle};
use crate::global::Binding;
use crate::types::Type;
use crate::value::{Instruction, Terminator, Value};

/// The pipeline stage of an entry-point function.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Stage {
    Vertex,
    Fragment,
    Compute,
}

impl Stage {
    /// The attribute spelling of this stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        }
    }
}

/// A formal parameter.
#[derive(Clone, Debug)]
pub struct FunctionParam {
    pub name: Option<String>,
    pub ty: Handle<Type>,
    /// IO binding for entry-point parameters.
    pub binding: Option<Binding>,
}

/// The return type of a function and its entry-point IO attributes.
#[derive(Clone, Debug)]
pub struct FunctionResult {
    pub ty: Handle<Type>,
    /// Location or builtin (position, frag-depth, sample-mask) binding.
    pub binding: Option<Binding>,
    /// `@invariant` on the position output.
    pub invariant: bool,
}

/// A function-local variable. Initialization is an explicit store in the
/// entry block.
#[derive(Clone, Debug)]
pub struct LocalVariable {
    pub name: Option<String>,
    pub ty: Handle<Type>,
}

/// A basic block: straight-line instructions ended by exactly one
/// terminator.
#[derive(Clone, Debug)]
pub struct Block {
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

impl Block {
    /// Creates an empty block terminated by `Unreachable`, to be filled
    /// in by the builder.
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
            terminator: Terminator::Unreachable,
        }
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

/// An IR function: parameters, locals, values, and a block graph rooted
/// at `entry`.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: Option<String>,
    /// Entry-point stage, if this function is one.
    pub stage: Option<Stage>,
    /// `@workgroup_size` for compute entry points.
    pub workgroup_size: Option<[u32; 3]>,
    pub params: Vec<FunctionParam>,
    pub result: Option<FunctionResult>,
    pub locals: Arena<LocalVariable>,
    pub values: Arena<Value>,
    pub blocks: Arena<Block>,
    pub entry: Handle<Block>,
}

impl Function {
    /// Creates an empty function with one (entry) block.
    pub fn new(name: impl Into<String>) -> Self {
        let mut blocks = Arena::new();
        let entry = blocks.append(Block::new());
        Self {
            name: Some(name.into()),
            stage: None,
            workgroup_size: None,
            params: Vec::new(),
            result: None,
            locals: Arena::new(),
            values: Arena::new(),
            blocks,
            entry,
        }
    }

    /// Appends a fresh empty block and returns its handle.
    pub fn add_block(&mut self) -> Handle<Block> {
        self.blocks.append(Block::new())
    }

    /// Appends a value of the given type, recording the source span it
    /// was lowered from.
    pub fn add_value(&mut self, ty: Handle<Type>, span: Span) -> Handle<Value> {
        self.values.append(Value { ty, span })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Literal, Op};

    #[test]
    fn new_function_has_entry_block() {
        let f = Function::new("main");
        assert_eq!(f.name.as_deref(), Some("main"));
        assert_eq!(f.blocks.len(), 1);
        assert!(matches!(f.blocks[f.entry].terminator, Terminator::Unreachable));
    }

    #[test]
    fn block_graph_construction() {
        let mut f = Function::new("f");
        let exit = f.add_block();
        f.blocks[f.entry].terminator = Terminator::Branch { target: exit };
        f.blocks[exit].terminator = Terminator::Return { value: None };
        assert_eq!(f.blocks.len(), 2);
    }

    #[test]
    fn values_carry_spans() {
        let mut types = crate::arena::UniqueArena::new();
        let ty = types.insert(Type {
            name: None,
            inner: crate::types::TypeInner::Scalar(crate::types::Scalar::I32),
        });
        let mut f = Function::new("f");
        let span = Span::point(shade_diag::Location::new(3, 7));
        let v = f.add_value(ty, span);
        f.blocks[f.entry].instructions.push(Instruction {
            result: Some(v),
            op: Op::Literal(Literal::I32(1)),
        });
        assert_eq!(f.values[v].span.start.line, 3);
        assert_eq!(f.values[v].span.start.column, 7);
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::Vertex.as_str(), "vertex");
        assert_eq!(Stage::Fragment.as_str(), "fragment");
        assert_eq!(Stage::Compute.as_str(), "compute");
    }
}
