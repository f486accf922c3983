//! The SPIR-V module walk.
//!
//! Sections are assembled separately (capabilities, entry points, debug
//! names, decorations, types/constants/globals, function bodies) and
//! concatenated in the order the SPIR-V spec requires. Types are
//! hash-consed so every non-aggregate type is declared exactly once;
//! buffer-backed globals are wrapped in a `Block` struct and unwrapped
//! with an access chain at each reference. Structured-control-flow merge
//! blocks are recovered from the block graph via immediate
//! post-dominators, and loop headers are found by their back edges.

use std::collections::{BTreeSet, HashMap, HashSet};

use shade_backend_core::EmitError;
use shade_diag::Span;
use shade_ir::{
    AddressSpace, ArraySize, Binding, Builtin, BuiltinValue, Function, Handle, Literal, Module,
    NameKey, Op, Scalar, ScalarKind, Stage, StorageAccess, Terminator, Type, TypeInner,
    UniqueArena, Value,
};

use crate::words::{f32_to_f16_bits, glsl450, op, Instruction, MAGIC, VERSION};

// Storage classes.
const SC_UNIFORM_CONSTANT: u32 = 0;
const SC_INPUT: u32 = 1;
const SC_UNIFORM: u32 = 2;
const SC_OUTPUT: u32 = 3;
const SC_WORKGROUP: u32 = 4;
const SC_PRIVATE: u32 = 6;
const SC_FUNCTION: u32 = 7;
const SC_STORAGE_BUFFER: u32 = 12;

// Decorations.
const DEC_BLOCK: u32 = 2;
const DEC_ARRAY_STRIDE: u32 = 6;
const DEC_BUILTIN: u32 = 11;
const DEC_INVARIANT: u32 = 18;
const DEC_NON_WRITABLE: u32 = 24;
const DEC_LOCATION: u32 = 30;
const DEC_BINDING: u32 = 33;
const DEC_DESCRIPTOR_SET: u32 = 34;
const DEC_OFFSET: u32 = 35;

// Capabilities.
const CAP_SHADER: u32 = 1;
const CAP_FLOAT16: u32 = 9;
const CAP_IMAGE_QUERY: u32 = 50;

// Scopes and memory semantics for barriers and atomics.
const SCOPE_DEVICE: u32 = 1;
const SCOPE_WORKGROUP: u32 = 2;
const SEM_RELAXED: u32 = 0;
const SEM_ACQUIRE_RELEASE: u32 = 0x8;
const SEM_UNIFORM_MEMORY: u32 = 0x40;
const SEM_WORKGROUP_MEMORY: u32 = 0x100;

pub(crate) fn emit_module(module: &Module) -> Result<Vec<u32>, EmitError> {
    let mut writer = Writer::new(module);
    writer.run()?;
    Ok(writer.assemble())
}

fn unsupported(span: Span, message: impl Into<String>) -> EmitError {
    EmitError::Unsupported {
        location: span.start,
        message: message.into(),
    }
}

fn storage_class(space: AddressSpace) -> u32 {
    match space {
        AddressSpace::Function => SC_FUNCTION,
        AddressSpace::Private => SC_PRIVATE,
        AddressSpace::Workgroup => SC_WORKGROUP,
        AddressSpace::Uniform => SC_UNIFORM,
        AddressSpace::Storage { .. } => SC_STORAGE_BUFFER,
        AddressSpace::Handle => SC_UNIFORM_CONSTANT,
    }
}

fn builtin_decoration(builtin: BuiltinValue) -> u32 {
    match builtin {
        BuiltinValue::Position => 0,
        BuiltinValue::FragDepth => 22,
        BuiltinValue::FrontFacing => 17,
        BuiltinValue::SampleIndex => 18,
        BuiltinValue::SampleMask => 20,
        BuiltinValue::NumWorkgroups => 24,
        BuiltinValue::WorkgroupId => 26,
        BuiltinValue::LocalInvocationId => 27,
        BuiltinValue::GlobalInvocationId => 28,
        BuiltinValue::LocalInvocationIndex => 29,
        BuiltinValue::VertexIndex => 42,
        BuiltinValue::InstanceIndex => 43,
    }
}

/// A module-scope variable as laid out in SPIR-V.
struct GlobalData {
    var_id: u32,
    /// Buffer-backed globals live inside a one-member `Block` struct and
    /// are unwrapped with an access chain.
    wrapped: bool,
}

struct Writer<'a> {
    module: &'a Module,
    /// Module types plus any derived types interned during emission.
    types: UniqueArena<Type>,
    next_id: u32,
    glsl_ext: u32,
    capabilities: BTreeSet<u32>,
    // Sections, concatenated by `assemble`.
    entry_points: Vec<u32>,
    execution_modes: Vec<u32>,
    debug_names: Vec<u32>,
    decorations: Vec<u32>,
    constants: Vec<u32>,
    code: Vec<u32>,
    // Memoization. Non-aggregate types must be declared exactly once.
    type_ids: HashMap<Handle<Type>, u32>,
    scalar_type_ids: HashMap<Scalar, u32>,
    void_type: Option<u32>,
    ptr_type_ids: HashMap<(u32, u32), u32>,
    fn_type_ids: HashMap<(u32, Vec<u32>), u32>,
    sampled_image_types: HashMap<u32, u32>,
    scalar_const_ids: HashMap<(u32, u32), u32>,
    bool_const_ids: HashMap<bool, u32>,
    null_const_ids: HashMap<u32, u32>,
    composite_const_ids: HashMap<(u32, Vec<u32>), u32>,
    globals: Vec<GlobalData>,
    function_ids: Vec<u32>,
}

impl<'a> Writer<'a> {
    fn new(module: &'a Module) -> Self {
        let mut writer = Self {
            module,
            types: module.types.clone(),
            next_id: 1,
            glsl_ext: 0,
            capabilities: BTreeSet::from([CAP_SHADER]),
            entry_points: Vec::new(),
            execution_modes: Vec::new(),
            debug_names: Vec::new(),
            decorations: Vec::new(),
            constants: Vec::new(),
            code: Vec::new(),
            type_ids: HashMap::new(),
            scalar_type_ids: HashMap::new(),
            void_type: None,
            ptr_type_ids: HashMap::new(),
            fn_type_ids: HashMap::new(),
            sampled_image_types: HashMap::new(),
            scalar_const_ids: HashMap::new(),
            bool_const_ids: HashMap::new(),
            null_const_ids: HashMap::new(),
            composite_const_ids: HashMap::new(),
            globals: Vec::new(),
            function_ids: Vec::new(),
        };
        writer.glsl_ext = writer.id();
        writer
    }

    fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn run(&mut self) -> Result<(), EmitError> {
        let global_handles: Vec<_> = self.module.globals.iter().map(|(h, _)| h).collect();
        for handle in global_handles {
            let data = self.emit_global(handle)?;
            self.globals.push(data);
        }

        // Pre-allocate function ids; WGSL declares before use, but calls
        // are resolved by id either way.
        for _ in 0..self.module.functions.len() {
            let id = self.id();
            self.function_ids.push(id);
        }
        let function_handles: Vec<_> = self.module.functions.iter().map(|(h, _)| h).collect();
        for handle in function_handles {
            self.emit_function(handle)?;
        }
        Ok(())
    }

    fn assemble(self) -> Vec<u32> {
        let mut out = vec![MAGIC, VERSION, 0, self.next_id, 0];
        for &capability in &self.capabilities {
            Instruction::new(op::CAPABILITY).op(capability).write(&mut out);
        }
        Instruction::new(op::EXT_INST_IMPORT)
            .op(self.glsl_ext)
            .str("GLSL.std.450")
            .write(&mut out);
        // Logical addressing, GLSL450 memory model.
        Instruction::new(op::MEMORY_MODEL).op(0).op(1).write(&mut out);
        out.extend(&self.entry_points);
        out.extend(&self.execution_modes);
        out.extend(&self.debug_names);
        out.extend(&self.decorations);
        out.extend(&self.constants);
        out.extend(&self.code);
        out
    }

    // ----- types and constants ------------------------------------------

    fn void_type_id(&mut self) -> u32 {
        if let Some(id) = self.void_type {
            return id;
        }
        let id = self.id();
        Instruction::new(op::TYPE_VOID).op(id).write(&mut self.constants);
        self.void_type = Some(id);
        id
    }

    fn scalar_type_id(&mut self, scalar: Scalar) -> u32 {
        // Abstract literals are concretized by lowering; be explicit in
        // case a folded constant slipped through with its abstract type.
        let scalar = match scalar.kind {
            ScalarKind::AbstractInt => Scalar::I32,
            ScalarKind::AbstractFloat => Scalar::F32,
            _ => scalar,
        };
        if let Some(&id) = self.scalar_type_ids.get(&scalar) {
            return id;
        }
        let id = self.id();
        match scalar.kind {
            ScalarKind::Bool => {
                Instruction::new(op::TYPE_BOOL).op(id).write(&mut self.constants);
            }
            ScalarKind::Sint => {
                Instruction::new(op::TYPE_INT)
                    .op(id)
                    .op(32)
                    .op(1)
                    .write(&mut self.constants);
            }
            ScalarKind::Uint => {
                Instruction::new(op::TYPE_INT)
                    .op(id)
                    .op(32)
                    .op(0)
                    .write(&mut self.constants);
            }
            ScalarKind::Float | ScalarKind::AbstractFloat | ScalarKind::AbstractInt => {
                if scalar.width == 2 {
                    self.capabilities.insert(CAP_FLOAT16);
                }
                Instruction::new(op::TYPE_FLOAT)
                    .op(id)
                    .op(u32::from(scalar.width) * 8)
                    .write(&mut self.constants);
            }
        }
        self.scalar_type_ids.insert(scalar, id);
        id
    }

    fn ptr_type_id(&mut self, class: u32, pointee: u32) -> u32 {
        if let Some(&id) = self.ptr_type_ids.get(&(class, pointee)) {
            return id;
        }
        let id = self.id();
        Instruction::new(op::TYPE_POINTER)
            .op(id)
            .op(class)
            .op(pointee)
            .write(&mut self.constants);
        self.ptr_type_ids.insert((class, pointee), id);
        id
    }

    fn fn_type_id(&mut self, return_ty: u32, params: Vec<u32>) -> u32 {
        if let Some(&id) = self.fn_type_ids.get(&(return_ty, params.clone())) {
            return id;
        }
        let id = self.id();
        Instruction::new(op::TYPE_FUNCTION)
            .op(id)
            .op(return_ty)
            .ops(&params)
            .write(&mut self.constants);
        self.fn_type_ids.insert((return_ty, params), id);
        id
    }

    fn sampled_image_type_id(&mut self, image: u32) -> u32 {
        if let Some(&id) = self.sampled_image_types.get(&image) {
            return id;
        }
        let id = self.id();
        Instruction::new(op::TYPE_SAMPLED_IMAGE)
            .op(id)
            .op(image)
            .write(&mut self.constants);
        self.sampled_image_types.insert(image, id);
        id
    }

    fn type_id(&mut self, handle: Handle<Type>, span: Span) -> Result<u32, EmitError> {
        if let Some(&id) = self.type_ids.get(&handle) {
            return Ok(id);
        }
        let ty = self.types[handle].clone();
        let id = match ty.inner {
            TypeInner::Void => self.void_type_id(),
            TypeInner::Scalar(scalar) | TypeInner::Atomic(scalar) => self.scalar_type_id(scalar),
            TypeInner::Vector { size, scalar } => {
                let component = self.scalar_type_id(scalar);
                let id = self.id();
                Instruction::new(op::TYPE_VECTOR)
                    .op(id)
                    .op(component)
                    .op(size as u32)
                    .write(&mut self.constants);
                id
            }
            TypeInner::Matrix {
                columns,
                rows,
                scalar,
            } => {
                let column = self.types.insert(Type {
                    name: None,
                    inner: TypeInner::Vector { size: rows, scalar },
                });
                let column = self.type_id(column, span)?;
                let id = self.id();
                Instruction::new(op::TYPE_MATRIX)
                    .op(id)
                    .op(column)
                    .op(columns as u32)
                    .write(&mut self.constants);
                id
            }
            TypeInner::Pointer { base, space } => {
                let pointee = self.type_id(base, span)?;
                self.ptr_type_id(storage_class(space), pointee)
            }
            TypeInner::Array { base, size, stride } => {
                let element = self.type_id(base, span)?;
                let id = match size {
                    ArraySize::Constant(n) => {
                        let length = self.const_u32(n);
                        let id = self.id();
                        Instruction::new(op::TYPE_ARRAY)
                            .op(id)
                            .op(element)
                            .op(length)
                            .write(&mut self.constants);
                        id
                    }
                    ArraySize::Dynamic => {
                        let id = self.id();
                        Instruction::new(op::TYPE_RUNTIME_ARRAY)
                            .op(id)
                            .op(element)
                            .write(&mut self.constants);
                        id
                    }
                };
                if stride > 0 {
                    Instruction::new(op::DECORATE)
                        .op(id)
                        .op(DEC_ARRAY_STRIDE)
                        .op(stride)
                        .write(&mut self.decorations);
                }
                id
            }
            TypeInner::Struct { ref members, .. } => {
                let mut member_ids = Vec::with_capacity(members.len());
                for member in members {
                    member_ids.push(self.type_id(member.ty, span)?);
                }
                let id = self.id();
                Instruction::new(op::TYPE_STRUCT)
                    .op(id)
                    .ops(&member_ids)
                    .write(&mut self.constants);
                if let Some(name) = &ty.name {
                    Instruction::new(op::NAME)
                        .op(id)
                        .str(name)
                        .write(&mut self.debug_names);
                }
                for (index, member) in members.iter().enumerate() {
                    Instruction::new(op::MEMBER_NAME)
                        .op(id)
                        .op(index as u32)
                        .str(&member.name)
                        .write(&mut self.debug_names);
                    Instruction::new(op::MEMBER_DECORATE)
                        .op(id)
                        .op(index as u32)
                        .op(DEC_OFFSET)
                        .op(member.offset)
                        .write(&mut self.decorations);
                }
                id
            }
            TypeInner::Sampler => {
                let id = self.id();
                Instruction::new(op::TYPE_SAMPLER).op(id).write(&mut self.constants);
                id
            }
            TypeInner::SampledTexture2d { scalar } => {
                let sampled = self.scalar_type_id(scalar);
                let id = self.id();
                // 2D, non-depth, non-arrayed, single-sampled, sampled
                // with an external sampler, unknown format.
                Instruction::new(op::TYPE_IMAGE)
                    .op(id)
                    .op(sampled)
                    .op(1)
                    .op(0)
                    .op(0)
                    .op(0)
                    .op(1)
                    .op(0)
                    .write(&mut self.constants);
                id
            }
            TypeInner::TextureExternal => {
                return Err(unsupported(
                    span,
                    "external textures must be expanded before SPIR-V emission",
                ));
            }
        };
        self.type_ids.insert(handle, id);
        Ok(id)
    }

    fn const_scalar_bits(&mut self, type_id: u32, bits: u32) -> u32 {
        if let Some(&id) = self.scalar_const_ids.get(&(type_id, bits)) {
            return id;
        }
        let id = self.id();
        Instruction::new(op::CONSTANT)
            .op(type_id)
            .op(id)
            .op(bits)
            .write(&mut self.constants);
        self.scalar_const_ids.insert((type_id, bits), id);
        id
    }

    fn const_u32(&mut self, value: u32) -> u32 {
        let ty = self.scalar_type_id(Scalar::U32);
        self.const_scalar_bits(ty, value)
    }

    fn const_i32(&mut self, value: i32) -> u32 {
        let ty = self.scalar_type_id(Scalar::I32);
        self.const_scalar_bits(ty, value as u32)
    }

    fn const_bool(&mut self, value: bool) -> u32 {
        if let Some(&id) = self.bool_const_ids.get(&value) {
            return id;
        }
        let ty = self.scalar_type_id(Scalar::BOOL);
        let id = self.id();
        let opcode = if value {
            op::CONSTANT_TRUE
        } else {
            op::CONSTANT_FALSE
        };
        Instruction::new(opcode).op(ty).op(id).write(&mut self.constants);
        self.bool_const_ids.insert(value, id);
        id
    }

    fn const_literal(&mut self, literal: Literal) -> u32 {
        match literal {
            Literal::Bool(v) => self.const_bool(v),
            Literal::I32(v) => self.const_i32(v),
            Literal::U32(v) => self.const_u32(v),
            Literal::F32(v) => {
                let ty = self.scalar_type_id(Scalar::F32);
                self.const_scalar_bits(ty, v.to_bits())
            }
            Literal::F16(v) => {
                let ty = self.scalar_type_id(Scalar::F16);
                self.const_scalar_bits(ty, u32::from(f32_to_f16_bits(v)))
            }
        }
    }

    fn const_null(&mut self, type_id: u32) -> u32 {
        if let Some(&id) = self.null_const_ids.get(&type_id) {
            return id;
        }
        let id = self.id();
        Instruction::new(op::CONSTANT_NULL)
            .op(type_id)
            .op(id)
            .write(&mut self.constants);
        self.null_const_ids.insert(type_id, id);
        id
    }

    fn const_composite(&mut self, type_id: u32, components: Vec<u32>) -> u32 {
        if let Some(&id) = self.composite_const_ids.get(&(type_id, components.clone())) {
            return id;
        }
        let id = self.id();
        Instruction::new(op::CONSTANT_COMPOSITE)
            .op(type_id)
            .op(id)
            .ops(&components)
            .write(&mut self.constants);
        self.composite_const_ids.insert((type_id, components), id);
        id
    }

    // ----- globals ------------------------------------------------------

    fn emit_global(
        &mut self,
        handle: Handle<shade_ir::GlobalVariable>,
    ) -> Result<GlobalData, EmitError> {
        let global = self.module.globals[handle].clone();
        let span = Span::default();
        let inner = self.type_id(global.ty, span)?;
        let class = storage_class(global.space);
        let (pointee, wrapped) = match global.space {
            AddressSpace::Uniform | AddressSpace::Storage { .. } => {
                let wrapper = self.id();
                Instruction::new(op::TYPE_STRUCT)
                    .op(wrapper)
                    .op(inner)
                    .write(&mut self.constants);
                Instruction::new(op::DECORATE)
                    .op(wrapper)
                    .op(DEC_BLOCK)
                    .write(&mut self.decorations);
                Instruction::new(op::MEMBER_DECORATE)
                    .op(wrapper)
                    .op(0)
                    .op(DEC_OFFSET)
                    .op(0)
                    .write(&mut self.decorations);
                if let AddressSpace::Storage { access } = global.space {
                    if !access.contains(StorageAccess::STORE) {
                        Instruction::new(op::MEMBER_DECORATE)
                            .op(wrapper)
                            .op(0)
                            .op(DEC_NON_WRITABLE)
                            .write(&mut self.decorations);
                    }
                }
                (wrapper, true)
            }
            _ => (inner, false),
        };

        let ptr = self.ptr_type_id(class, pointee);
        let var_id = self.id();
        let mut inst = Instruction::new(op::VARIABLE).op(ptr).op(var_id).op(class);
        if let Some(init) = global.init {
            if global.space == AddressSpace::Private {
                let init = self.const_literal(init);
                inst = inst.op(init);
            }
        }
        inst.write(&mut self.constants);

        if let Some(binding) = global.binding {
            Instruction::new(op::DECORATE)
                .op(var_id)
                .op(DEC_DESCRIPTOR_SET)
                .op(binding.group)
                .write(&mut self.decorations);
            Instruction::new(op::DECORATE)
                .op(var_id)
                .op(DEC_BINDING)
                .op(binding.binding)
                .write(&mut self.decorations);
        }
        if let Some(name) = self
            .module
            .names
            .name_of(NameKey::Global(handle))
            .or(global.name.as_deref())
        {
            Instruction::new(op::NAME)
                .op(var_id)
                .str(name)
                .write(&mut self.debug_names);
        }
        Ok(GlobalData { var_id, wrapped })
    }

    // ----- functions ----------------------------------------------------

    fn emit_function(&mut self, handle: Handle<Function>) -> Result<(), EmitError> {
        let f = &self.module.functions[handle];
        let fn_id = self.function_ids[handle.index()];
        let name = self
            .module
            .names
            .name_of(NameKey::Function(handle))
            .or(f.name.as_deref())
            .unwrap_or("function")
            .to_string();
        Instruction::new(op::NAME)
            .op(fn_id)
            .str(&name)
            .write(&mut self.debug_names);

        let is_entry = f.stage.is_some();
        let mut interface = Vec::new();
        // For entry points, parameters become Input variables and the
        // result an Output variable; SPIR-V entry functions take none.
        let mut input_vars = Vec::with_capacity(f.params.len());
        let mut output_var = None;
        let span = Span::default();

        let (return_type, fn_type) = if is_entry {
            for param in &f.params {
                let ty = self.type_id(param.ty, span)?;
                let ptr = self.ptr_type_id(SC_INPUT, ty);
                let var = self.id();
                Instruction::new(op::VARIABLE)
                    .op(ptr)
                    .op(var)
                    .op(SC_INPUT)
                    .write(&mut self.constants);
                self.decorate_io(var, param.binding);
                if let Some(name) = &param.name {
                    Instruction::new(op::NAME)
                        .op(var)
                        .str(name)
                        .write(&mut self.debug_names);
                }
                interface.push(var);
                input_vars.push((var, ty));
            }
            if let Some(result) = &f.result {
                let ty = self.type_id(result.ty, span)?;
                let ptr = self.ptr_type_id(SC_OUTPUT, ty);
                let var = self.id();
                Instruction::new(op::VARIABLE)
                    .op(ptr)
                    .op(var)
                    .op(SC_OUTPUT)
                    .write(&mut self.constants);
                self.decorate_io(var, result.binding);
                if result.invariant {
                    Instruction::new(op::DECORATE)
                        .op(var)
                        .op(DEC_INVARIANT)
                        .write(&mut self.decorations);
                }
                interface.push(var);
                output_var = Some(var);
            }
            let void = self.void_type_id();
            (void, self.fn_type_id(void, Vec::new()))
        } else {
            let return_type = match &f.result {
                Some(result) => self.type_id(result.ty, span)?,
                None => self.void_type_id(),
            };
            let mut params = Vec::with_capacity(f.params.len());
            for param in &f.params {
                params.push(self.type_id(param.ty, span)?);
            }
            (return_type, self.fn_type_id(return_type, params))
        };

        match f.stage {
            Some(Stage::Compute) => {
                let [x, y, z] = f.workgroup_size.unwrap_or([1, 1, 1]);
                Instruction::new(op::ENTRY_POINT)
                    .op(5) // GLCompute
                    .op(fn_id)
                    .str(&name)
                    .ops(&interface)
                    .write(&mut self.entry_points);
                Instruction::new(op::EXECUTION_MODE)
                    .op(fn_id)
                    .op(17) // LocalSize
                    .op(x)
                    .op(y)
                    .op(z)
                    .write(&mut self.execution_modes);
            }
            Some(Stage::Fragment) => {
                Instruction::new(op::ENTRY_POINT)
                    .op(4) // Fragment
                    .op(fn_id)
                    .str(&name)
                    .ops(&interface)
                    .write(&mut self.entry_points);
                Instruction::new(op::EXECUTION_MODE)
                    .op(fn_id)
                    .op(7) // OriginUpperLeft
                    .write(&mut self.execution_modes);
            }
            Some(Stage::Vertex) => {
                Instruction::new(op::ENTRY_POINT)
                    .op(0) // Vertex
                    .op(fn_id)
                    .str(&name)
                    .ops(&interface)
                    .write(&mut self.entry_points);
            }
            None => {}
        }

        Instruction::new(op::FUNCTION)
            .op(return_type)
            .op(fn_id)
            .op(0) // FunctionControl::None
            .op(fn_type)
            .write(&mut self.code);

        let mut param_ids = Vec::with_capacity(f.params.len());
        if !is_entry {
            for param in &f.params {
                let ty = self.type_id(param.ty, span)?;
                let id = self.id();
                Instruction::new(op::FUNCTION_PARAMETER)
                    .op(ty)
                    .op(id)
                    .write(&mut self.code);
                if let Some(name) = &param.name {
                    Instruction::new(op::NAME)
                        .op(id)
                        .str(name)
                        .write(&mut self.debug_names);
                }
                param_ids.push(id);
            }
        }

        let mut block_ids = Vec::with_capacity(f.blocks.len());
        for _ in 0..f.blocks.len() {
            let id = self.id();
            block_ids.push(id);
        }

        // Function-storage locals; SPIR-V wants them at the head of the
        // first block.
        let mut local_ids = Vec::with_capacity(f.locals.len());
        let mut local_decls = Vec::new();
        for (lh, local) in f.locals.iter() {
            let ty = self.type_id(local.ty, span)?;
            let ptr = self.ptr_type_id(SC_FUNCTION, ty);
            let id = self.id();
            local_decls.push((ptr, id));
            if let Some(name) = self
                .module
                .names
                .name_of(NameKey::Local(handle, lh))
                .or(local.name.as_deref())
            {
                Instruction::new(op::NAME)
                    .op(id)
                    .str(name)
                    .write(&mut self.debug_names);
            }
            local_ids.push(id);
        }

        let structure = Structure::analyze(f);
        let mut ctx = FnCtx {
            handle,
            value_ids: vec![None; f.values.len()],
            block_ids,
            local_ids,
            param_ids,
            input_vars,
            output_var,
            is_entry,
            buffer_roots: HashMap::new(),
            synth_blocks: Vec::new(),
        };

        let block_handles: Vec<_> = f.blocks.iter().map(|(h, _)| h).collect();
        for (index, bh) in block_handles.iter().enumerate() {
            Instruction::new(op::LABEL)
                .op(ctx.block_ids[index])
                .write(&mut self.code);
            if *bh == f.entry {
                for &(ptr, id) in &local_decls {
                    Instruction::new(op::VARIABLE)
                        .op(ptr)
                        .op(id)
                        .op(SC_FUNCTION)
                        .write(&mut self.code);
                }
            }
            for instruction in &f.blocks[*bh].instructions {
                self.emit_op(f, &mut ctx, instruction)?;
            }
            self.emit_terminator(&mut ctx, index, &f.blocks[*bh].terminator, &structure)?;
        }

        // Merge blocks synthesized for constructs whose branches never
        // reconverge.
        for id in std::mem::take(&mut ctx.synth_blocks) {
            Instruction::new(op::LABEL).op(id).write(&mut self.code);
            Instruction::new(op::UNREACHABLE).write(&mut self.code);
        }

        Instruction::new(op::FUNCTION_END).write(&mut self.code);
        Ok(())
    }

    fn decorate_io(&mut self, var: u32, binding: Option<Binding>) {
        match binding {
            Some(Binding::BuiltIn(builtin)) => {
                Instruction::new(op::DECORATE)
                    .op(var)
                    .op(DEC_BUILTIN)
                    .op(builtin_decoration(builtin))
                    .write(&mut self.decorations);
            }
            Some(Binding::Location(location)) => {
                Instruction::new(op::DECORATE)
                    .op(var)
                    .op(DEC_LOCATION)
                    .op(location)
                    .write(&mut self.decorations);
            }
            None => {}
        }
    }

    // ----- instructions -------------------------------------------------

    #[allow(clippy::too_many_lines)]
    fn emit_op(
        &mut self,
        f: &Function,
        ctx: &mut FnCtx,
        instruction: &shade_ir::Instruction,
    ) -> Result<(), EmitError> {
        let result = instruction.result;
        let (result_ty, span) = match result {
            Some(v) => {
                let value = &f.values[v];
                (Some(value.ty), value.span)
            }
            None => (None, Span::default()),
        };

        match instruction.op.clone() {
            Op::Literal(literal) => {
                let id = self.const_literal(literal);
                ctx.bind(result, id);
            }
            Op::Param(index) => {
                if ctx.is_entry {
                    let (var, ty) = ctx.input_vars[index as usize];
                    let id = self.id();
                    Instruction::new(op::LOAD)
                        .op(ty)
                        .op(id)
                        .op(var)
                        .write(&mut self.code);
                    ctx.bind(result, id);
                } else {
                    ctx.bind(result, ctx.param_ids[index as usize]);
                }
            }
            Op::GlobalRef(global) => {
                let data = &self.globals[global.index()];
                let (var_id, wrapped) = (data.var_id, data.wrapped);
                let ty = result_ty.expect("global reference produces a value");
                if wrapped {
                    let result_type = self.type_id(ty, span)?;
                    let zero = self.const_u32(0);
                    let id = self.id();
                    Instruction::new(op::ACCESS_CHAIN)
                        .op(result_type)
                        .op(id)
                        .op(var_id)
                        .op(zero)
                        .write(&mut self.code);
                    ctx.bind(result, id);
                    if let Some(v) = result {
                        ctx.buffer_roots.insert(v, var_id);
                    }
                } else if self.types[ty].inner.is_handle() {
                    let result_type = self.type_id(ty, span)?;
                    let id = self.id();
                    Instruction::new(op::LOAD)
                        .op(result_type)
                        .op(id)
                        .op(var_id)
                        .write(&mut self.code);
                    ctx.bind(result, id);
                } else {
                    ctx.bind(result, var_id);
                }
            }
            Op::LocalRef(local) => {
                ctx.bind(result, ctx.local_ids[local.index()]);
            }
            Op::Load { pointer } => {
                let ty = self.type_id(result_ty.expect("load produces a value"), span)?;
                let id = self.id();
                Instruction::new(op::LOAD)
                    .op(ty)
                    .op(id)
                    .op(ctx.get(pointer))
                    .write(&mut self.code);
                ctx.bind(result, id);
            }
            Op::Store { pointer, value } => {
                Instruction::new(op::STORE)
                    .op(ctx.get(pointer))
                    .op(ctx.get(value))
                    .write(&mut self.code);
            }
            Op::Access { base, index } => {
                let ty_handle = result_ty.expect("access produces a value");
                let result_type = self.type_id(ty_handle, span)?;
                let id = self.id();
                match self.types[f.values[base].ty].inner {
                    TypeInner::Pointer { .. } => {
                        Instruction::new(op::ACCESS_CHAIN)
                            .op(result_type)
                            .op(id)
                            .op(ctx.get(base))
                            .op(ctx.get(index))
                            .write(&mut self.code);
                    }
                    TypeInner::Vector { .. } => {
                        Instruction::new(op::VECTOR_EXTRACT_DYNAMIC)
                            .op(result_type)
                            .op(id)
                            .op(ctx.get(base))
                            .op(ctx.get(index))
                            .write(&mut self.code);
                    }
                    _ => {
                        return Err(unsupported(
                            span,
                            "dynamic indexing of a composite value; store it in a var first",
                        ));
                    }
                }
                ctx.bind(result, id);
            }
            Op::AccessMember { base, member } => {
                let ty_handle = result_ty.expect("member access produces a value");
                let result_type = self.type_id(ty_handle, span)?;
                let id = self.id();
                if matches!(self.types[f.values[base].ty].inner, TypeInner::Pointer { .. }) {
                    let index = self.const_u32(member);
                    Instruction::new(op::ACCESS_CHAIN)
                        .op(result_type)
                        .op(id)
                        .op(ctx.get(base))
                        .op(index)
                        .write(&mut self.code);
                } else {
                    Instruction::new(op::COMPOSITE_EXTRACT)
                        .op(result_type)
                        .op(id)
                        .op(ctx.get(base))
                        .op(member)
                        .write(&mut self.code);
                }
                ctx.bind(result, id);
            }
            Op::Swizzle {
                vector,
                size,
                pattern,
            } => {
                let ty = self.type_id(result_ty.expect("swizzle produces a value"), span)?;
                let id = self.id();
                let mut inst = Instruction::new(op::VECTOR_SHUFFLE)
                    .op(ty)
                    .op(id)
                    .op(ctx.get(vector))
                    .op(ctx.get(vector));
                for component in pattern.iter().take(size as usize) {
                    inst = inst.op(*component as u32);
                }
                inst.write(&mut self.code);
                ctx.bind(result, id);
            }
            Op::Construct { ty, components } => {
                let result_type = self.type_id(ty, span)?;
                if components.is_empty() {
                    let id = self.const_null(result_type);
                    ctx.bind(result, id);
                    return Ok(());
                }
                let mut component_ids: Vec<u32> =
                    components.iter().map(|&c| ctx.get(c)).collect();
                // One-scalar vector constructors splat.
                if let TypeInner::Vector { size, .. } = self.types[ty].inner {
                    if component_ids.len() == 1
                        && matches!(
                            self.types[f.values[components[0]].ty].inner,
                            TypeInner::Scalar(_)
                        )
                    {
                        component_ids = vec![component_ids[0]; size as usize];
                    }
                }
                let id = self.id();
                Instruction::new(op::COMPOSITE_CONSTRUCT)
                    .op(result_type)
                    .op(id)
                    .ops(&component_ids)
                    .write(&mut self.code);
                ctx.bind(result, id);
            }
            Op::Convert { value, kind, width } => {
                let id = self.emit_convert(f, ctx, value, kind, width, result_ty, span)?;
                ctx.bind(result, id);
            }
            Op::Unary { op: unary, value } => {
                let ty_handle = result_ty.expect("unary produces a value");
                let scalar = self.types[ty_handle].inner.scalar().unwrap_or(Scalar::F32);
                let opcode = match unary {
                    shade_ir::UnaryOp::Negate if scalar.is_float() => op::F_NEGATE,
                    shade_ir::UnaryOp::Negate => op::S_NEGATE,
                    shade_ir::UnaryOp::LogicalNot => op::LOGICAL_NOT,
                    shade_ir::UnaryOp::BitwiseNot => op::NOT,
                };
                let ty = self.type_id(ty_handle, span)?;
                let id = self.id();
                Instruction::new(opcode)
                    .op(ty)
                    .op(id)
                    .op(ctx.get(value))
                    .write(&mut self.code);
                ctx.bind(result, id);
            }
            Op::Binary { op: binary, left, right } => {
                let id = self.emit_binary(f, ctx, binary, left, right, result_ty, span)?;
                ctx.bind(result, id);
            }
            Op::Call {
                function,
                arguments,
            } => {
                let ty = self.type_id(result_ty.expect("call produces a value"), span)?;
                let id = self.id();
                let mut inst = Instruction::new(op::FUNCTION_CALL)
                    .op(ty)
                    .op(id)
                    .op(self.function_ids[function.index()]);
                for &argument in &arguments {
                    inst = inst.op(ctx.get(argument));
                }
                inst.write(&mut self.code);
                ctx.bind(result, id);
            }
            Op::Builtin { fun, arguments } => {
                self.emit_builtin(f, ctx, fun, &arguments, result, result_ty, span)?;
            }
        }
        if let Some(v) = result {
            if let Some(id) = ctx.value_ids[v.index()] {
                self.name_value(ctx.handle, Some(v), id);
            }
        }
        Ok(())
    }

    fn name_value(&mut self, function: Handle<Function>, value: Option<Handle<Value>>, id: u32) {
        let Some(value) = value else { return };
        if let Some(name) = self.module.names.name_of(NameKey::Value(function, value)) {
            Instruction::new(op::NAME)
                .op(id)
                .str(name)
                .write(&mut self.debug_names);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_convert(
        &mut self,
        f: &Function,
        ctx: &mut FnCtx,
        value: Handle<Value>,
        kind: ScalarKind,
        width: u8,
        result_ty: Option<Handle<Type>>,
        span: Span,
    ) -> Result<u32, EmitError> {
        let source = self.types[f.values[value].ty]
            .inner
            .scalar()
            .unwrap_or(Scalar::F32);
        let source_kind = match source.kind {
            ScalarKind::AbstractInt => ScalarKind::Sint,
            ScalarKind::AbstractFloat => ScalarKind::Float,
            other => other,
        };
        let destination = Scalar { kind, width };
        if source_kind == kind && source.width == width {
            return Ok(ctx.get(value));
        }
        let ty_handle = result_ty.expect("conversion produces a value");
        let ty = self.type_id(ty_handle, span)?;
        let value_id = ctx.get(value);
        let id = self.id();
        use ScalarKind as K;
        match (source_kind, kind) {
            (K::Float, K::Float) => {
                Instruction::new(op::F_CONVERT).op(ty).op(id).op(value_id).write(&mut self.code);
            }
            (K::Sint, K::Sint) => {
                Instruction::new(op::S_CONVERT).op(ty).op(id).op(value_id).write(&mut self.code);
            }
            (K::Uint, K::Uint) => {
                Instruction::new(op::U_CONVERT).op(ty).op(id).op(value_id).write(&mut self.code);
            }
            (K::Float, K::Sint) => {
                Instruction::new(op::CONVERT_F_TO_S).op(ty).op(id).op(value_id).write(&mut self.code);
            }
            (K::Float, K::Uint) => {
                Instruction::new(op::CONVERT_F_TO_U).op(ty).op(id).op(value_id).write(&mut self.code);
            }
            (K::Sint, K::Float) => {
                Instruction::new(op::CONVERT_S_TO_F).op(ty).op(id).op(value_id).write(&mut self.code);
            }
            (K::Uint, K::Float) => {
                Instruction::new(op::CONVERT_U_TO_F).op(ty).op(id).op(value_id).write(&mut self.code);
            }
            (K::Sint, K::Uint) | (K::Uint, K::Sint) => {
                Instruction::new(op::BITCAST).op(ty).op(id).op(value_id).write(&mut self.code);
            }
            (K::Bool, _) => {
                let (one, zero) = match destination.kind {
                    K::Float => {
                        let one = self.const_literal(Literal::F32(1.0));
                        let zero = self.const_literal(Literal::F32(0.0));
                        (one, zero)
                    }
                    K::Uint => (self.const_u32(1), self.const_u32(0)),
                    _ => (self.const_i32(1), self.const_i32(0)),
                };
                Instruction::new(op::SELECT)
                    .op(ty)
                    .op(id)
                    .op(value_id)
                    .op(one)
                    .op(zero)
                    .write(&mut self.code);
            }
            (source, K::Bool) => {
                let (opcode, zero) = if source == K::Float {
                    (op::F_ORD_NOT_EQUAL, self.const_literal(Literal::F32(0.0)))
                } else {
                    (op::I_NOT_EQUAL, self.const_u32(0))
                };
                Instruction::new(opcode)
                    .op(ty)
                    .op(id)
                    .op(value_id)
                    .op(zero)
                    .write(&mut self.code);
            }
            _ => {
                return Err(unsupported(span, "unsupported numeric conversion"));
            }
        }
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_binary(
        &mut self,
        f: &Function,
        ctx: &mut FnCtx,
        binary: shade_ir::BinaryOp,
        left: Handle<Value>,
        right: Handle<Value>,
        result_ty: Option<Handle<Type>>,
        span: Span,
    ) -> Result<u32, EmitError> {
        use shade_ir::BinaryOp as B;
        let ty_handle = result_ty.expect("binary produces a value");
        let left_inner = self.types[f.values[left].ty].inner.clone();
        let right_inner = self.types[f.values[right].ty].inner.clone();
        let operand = self.types[f.values[left].ty]
            .inner
            .scalar()
            .unwrap_or(Scalar::F32);
        let operand_kind = match operand.kind {
            ScalarKind::AbstractInt => ScalarKind::Sint,
            ScalarKind::AbstractFloat => ScalarKind::Float,
            other => other,
        };
        use ScalarKind as K;
        let (opcode, lhs, rhs) = match binary {
            B::Multiply => {
                // Mixed vector/matrix/scalar products have dedicated
                // opcodes; operand order matters.
                match (&left_inner, &right_inner) {
                    (TypeInner::Matrix { .. }, TypeInner::Matrix { .. }) => {
                        (op::MATRIX_TIMES_MATRIX, left, right)
                    }
                    (TypeInner::Matrix { .. }, TypeInner::Vector { .. }) => {
                        (op::MATRIX_TIMES_VECTOR, left, right)
                    }
                    (TypeInner::Vector { .. }, TypeInner::Matrix { .. }) => {
                        (op::VECTOR_TIMES_MATRIX, left, right)
                    }
                    (TypeInner::Matrix { .. }, TypeInner::Scalar(_)) => {
                        (op::MATRIX_TIMES_SCALAR, left, right)
                    }
                    (TypeInner::Scalar(_), TypeInner::Matrix { .. }) => {
                        (op::MATRIX_TIMES_SCALAR, right, left)
                    }
                    (TypeInner::Vector { scalar, .. }, TypeInner::Scalar(_))
                        if scalar.is_float() =>
                    {
                        (op::VECTOR_TIMES_SCALAR, left, right)
                    }
                    (TypeInner::Scalar(_), TypeInner::Vector { scalar, .. })
                        if scalar.is_float() =>
                    {
                        (op::VECTOR_TIMES_SCALAR, right, left)
                    }
                    _ if operand_kind == K::Float => (op::F_MUL, left, right),
                    _ => (op::I_MUL, left, right),
                }
            }
            B::Add if operand_kind == K::Float => (op::F_ADD, left, right),
            B::Add => (op::I_ADD, left, right),
            B::Subtract if operand_kind == K::Float => (op::F_SUB, left, right),
            B::Subtract => (op::I_SUB, left, right),
            B::Divide => match operand_kind {
                K::Float => (op::F_DIV, left, right),
                K::Uint => (op::U_DIV, left, right),
                _ => (op::S_DIV, left, right),
            },
            B::Modulo => match operand_kind {
                K::Float => (op::F_REM, left, right),
                K::Uint => (op::U_MOD, left, right),
                _ => (op::S_REM, left, right),
            },
            B::Equal => match operand_kind {
                K::Float => (op::F_ORD_EQUAL, left, right),
                K::Bool => (op::LOGICAL_EQUAL, left, right),
                _ => (op::I_EQUAL, left, right),
            },
            B::NotEqual => match operand_kind {
                K::Float => (op::F_ORD_NOT_EQUAL, left, right),
                K::Bool => (op::LOGICAL_NOT_EQUAL, left, right),
                _ => (op::I_NOT_EQUAL, left, right),
            },
            B::Less => match operand_kind {
                K::Float => (op::F_ORD_LESS_THAN, left, right),
                K::Uint => (op::U_LESS_THAN, left, right),
                _ => (op::S_LESS_THAN, left, right),
            },
            B::LessEqual => match operand_kind {
                K::Float => (op::F_ORD_LESS_THAN_EQUAL, left, right),
                K::Uint => (op::U_LESS_THAN_EQUAL, left, right),
                _ => (op::S_LESS_THAN_EQUAL, left, right),
            },
            B::Greater => match operand_kind {
                K::Float => (op::F_ORD_GREATER_THAN, left, right),
                K::Uint => (op::U_GREATER_THAN, left, right),
                _ => (op::S_GREATER_THAN, left, right),
            },
            B::GreaterEqual => match operand_kind {
                K::Float => (op::F_ORD_GREATER_THAN_EQUAL, left, right),
                K::Uint => (op::U_GREATER_THAN_EQUAL, left, right),
                _ => (op::S_GREATER_THAN_EQUAL, left, right),
            },
            B::LogicalAnd => (op::LOGICAL_AND, left, right),
            B::LogicalOr => (op::LOGICAL_OR, left, right),
            B::BitwiseAnd => (op::BITWISE_AND, left, right),
            B::BitwiseOr => (op::BITWISE_OR, left, right),
            B::BitwiseXor => (op::BITWISE_XOR, left, right),
            B::ShiftLeft => (op::SHIFT_LEFT_LOGICAL, left, right),
            B::ShiftRight if operand_kind == K::Sint => (op::SHIFT_RIGHT_ARITHMETIC, left, right),
            B::ShiftRight => (op::SHIFT_RIGHT_LOGICAL, left, right),
        };
        let ty = self.type_id(ty_handle, span)?;
        let id = self.id();
        Instruction::new(opcode)
            .op(ty)
            .op(id)
            .op(ctx.get(lhs))
            .op(ctx.get(rhs))
            .write(&mut self.code);
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_builtin(
        &mut self,
        f: &Function,
        ctx: &mut FnCtx,
        fun: Builtin,
        arguments: &[Handle<Value>],
        result: Option<Handle<Value>>,
        result_ty: Option<Handle<Type>>,
        span: Span,
    ) -> Result<(), EmitError> {
        use Builtin as B;
        let args: Vec<u32> = arguments.iter().map(|&a| ctx.get(a)).collect();
        let result_scalar = result_ty
            .and_then(|ty| self.types[ty].inner.scalar())
            .unwrap_or(Scalar::F32);
        let result_kind = match result_scalar.kind {
            ScalarKind::AbstractInt => ScalarKind::Sint,
            ScalarKind::AbstractFloat => ScalarKind::Float,
            other => other,
        };

        match fun {
            B::WorkgroupBarrier | B::StorageBarrier => {
                let exec = self.const_u32(SCOPE_WORKGROUP);
                let (memory, semantics) = if fun == B::WorkgroupBarrier {
                    (SCOPE_WORKGROUP, SEM_ACQUIRE_RELEASE | SEM_WORKGROUP_MEMORY)
                } else {
                    (SCOPE_DEVICE, SEM_ACQUIRE_RELEASE | SEM_UNIFORM_MEMORY)
                };
                let memory = self.const_u32(memory);
                let semantics = self.const_u32(semantics);
                Instruction::new(op::CONTROL_BARRIER)
                    .op(exec)
                    .op(memory)
                    .op(semantics)
                    .write(&mut self.code);
                return Ok(());
            }
            B::AtomicStore => {
                let scope = self.const_u32(SCOPE_DEVICE);
                let semantics = self.const_u32(SEM_RELAXED);
                Instruction::new(op::ATOMIC_STORE)
                    .op(args[0])
                    .op(scope)
                    .op(semantics)
                    .op(args[1])
                    .write(&mut self.code);
                return Ok(());
            }
            _ => {}
        }

        let ty_handle = result_ty.expect("builtin call produces a value");
        let ty = self.type_id(ty_handle, span)?;
        let id = self.id();

        match fun {
            B::Select => {
                // WGSL select(false_value, true_value, condition).
                Instruction::new(op::SELECT)
                    .op(ty)
                    .op(id)
                    .op(args[2])
                    .op(args[1])
                    .op(args[0])
                    .write(&mut self.code);
            }
            B::Dot => {
                Instruction::new(op::DOT)
                    .op(ty)
                    .op(id)
                    .op(args[0])
                    .op(args[1])
                    .write(&mut self.code);
            }
            B::ArrayLength => {
                let root = ctx.buffer_roots.get(&arguments[0]).copied().ok_or_else(|| {
                    unsupported(span, "arrayLength requires a storage buffer array pointer")
                })?;
                Instruction::new(op::ARRAY_LENGTH)
                    .op(ty)
                    .op(id)
                    .op(root)
                    .op(0)
                    .write(&mut self.code);
            }
            B::Dpdx | B::Dpdy | B::Fwidth => {
                let opcode = match fun {
                    B::Dpdx => op::D_PDX,
                    B::Dpdy => op::D_PDY,
                    _ => op::FWIDTH,
                };
                Instruction::new(opcode)
                    .op(ty)
                    .op(id)
                    .op(args[0])
                    .write(&mut self.code);
            }
            B::TextureSample => {
                let image_ty = self.type_id(f.values[arguments[0]].ty, span)?;
                let sampled_ty = self.sampled_image_type_id(image_ty);
                let sampled = self.id();
                Instruction::new(op::SAMPLED_IMAGE)
                    .op(sampled_ty)
                    .op(sampled)
                    .op(args[0])
                    .op(args[1])
                    .write(&mut self.code);
                Instruction::new(op::IMAGE_SAMPLE_IMPLICIT_LOD)
                    .op(ty)
                    .op(id)
                    .op(sampled)
                    .op(args[2])
                    .write(&mut self.code);
            }
            B::TextureLoad => {
                Instruction::new(op::IMAGE_FETCH)
                    .op(ty)
                    .op(id)
                    .op(args[0])
                    .op(args[1])
                    .op(0x2) // ImageOperands::Lod
                    .op(args[2])
                    .write(&mut self.code);
            }
            B::TextureDimensions => {
                self.capabilities.insert(CAP_IMAGE_QUERY);
                let lod = self.const_i32(0);
                Instruction::new(op::IMAGE_QUERY_SIZE_LOD)
                    .op(ty)
                    .op(id)
                    .op(args[0])
                    .op(lod)
                    .write(&mut self.code);
            }
            B::AtomicLoad => {
                let scope = self.const_u32(SCOPE_DEVICE);
                let semantics = self.const_u32(SEM_RELAXED);
                Instruction::new(op::ATOMIC_LOAD)
                    .op(ty)
                    .op(id)
                    .op(args[0])
                    .op(scope)
                    .op(semantics)
                    .write(&mut self.code);
            }
            B::AtomicAdd
            | B::AtomicSub
            | B::AtomicAnd
            | B::AtomicOr
            | B::AtomicXor
            | B::AtomicMin
            | B::AtomicMax
            | B::AtomicExchange => {
                let opcode = match (fun, result_kind) {
                    (B::AtomicAdd, _) => op::ATOMIC_I_ADD,
                    (B::AtomicSub, _) => op::ATOMIC_I_SUB,
                    (B::AtomicAnd, _) => op::ATOMIC_AND,
                    (B::AtomicOr, _) => op::ATOMIC_OR,
                    (B::AtomicXor, _) => op::ATOMIC_XOR,
                    (B::AtomicMin, ScalarKind::Uint) => op::ATOMIC_U_MIN,
                    (B::AtomicMin, _) => op::ATOMIC_S_MIN,
                    (B::AtomicMax, ScalarKind::Uint) => op::ATOMIC_U_MAX,
                    (B::AtomicMax, _) => op::ATOMIC_S_MAX,
                    _ => op::ATOMIC_EXCHANGE,
                };
                let scope = self.const_u32(SCOPE_DEVICE);
                let semantics = self.const_u32(SEM_RELAXED);
                Instruction::new(opcode)
                    .op(ty)
                    .op(id)
                    .op(args[0])
                    .op(scope)
                    .op(semantics)
                    .op(args[1])
                    .write(&mut self.code);
            }
            B::Saturate => {
                let (zero, one) = self.clamp_bounds(ty_handle, span)?;
                Instruction::new(op::EXT_INST)
                    .op(ty)
                    .op(id)
                    .op(self.glsl_ext)
                    .op(glsl450::F_CLAMP)
                    .op(args[0])
                    .op(zero)
                    .op(one)
                    .write(&mut self.code);
            }
            _ => {
                let inst = ext_inst_for(fun, result_kind).ok_or_else(|| {
                    unsupported(
                        span,
                        format!(
                            "builtin '{}' is not supported by the SPIR-V backend",
                            fun.wgsl_name()
                        ),
                    )
                })?;
                Instruction::new(op::EXT_INST)
                    .op(ty)
                    .op(id)
                    .op(self.glsl_ext)
                    .op(inst)
                    .ops(&args)
                    .write(&mut self.code);
            }
        }
        ctx.bind(result, id);
        Ok(())
    }

    /// Zero and one constants matching a float scalar or vector type,
    /// for saturate's clamp bounds.
    fn clamp_bounds(
        &mut self,
        ty: Handle<Type>,
        span: Span,
    ) -> Result<(u32, u32), EmitError> {
        match self.types[ty].inner {
            TypeInner::Scalar(_) => Ok((
                self.const_literal(Literal::F32(0.0)),
                self.const_literal(Literal::F32(1.0)),
            )),
            TypeInner::Vector { size, .. } => {
                let zero = self.const_literal(Literal::F32(0.0));
                let one = self.const_literal(Literal::F32(1.0));
                let ty_id = self.type_id(ty, span)?;
                Ok((
                    self.const_composite(ty_id, vec![zero; size as usize]),
                    self.const_composite(ty_id, vec![one; size as usize]),
                ))
            }
            _ => Err(unsupported(span, "saturate requires a float scalar or vector")),
        }
    }

    // ----- terminators --------------------------------------------------

    fn emit_terminator(
        &mut self,
        ctx: &mut FnCtx,
        block_index: usize,
        terminator: &Terminator,
        structure: &Structure,
    ) -> Result<(), EmitError> {
        let is_loop_header = structure.loop_headers.contains(&block_index);
        let branches = matches!(
            terminator,
            Terminator::Branch { .. } | Terminator::BranchIf { .. } | Terminator::Switch { .. }
        );
        if is_loop_header && branches {
            let merge = self.merge_id(ctx, structure.ipdom[block_index]);
            let continue_id = ctx.block_ids[structure.continue_source[&block_index]];
            Instruction::new(op::LOOP_MERGE)
                .op(merge)
                .op(continue_id)
                .op(0) // LoopControl::None
                .write(&mut self.code);
        } else if matches!(
            terminator,
            Terminator::BranchIf { .. } | Terminator::Switch { .. }
        ) {
            let merge = self.merge_id(ctx, structure.ipdom[block_index]);
            Instruction::new(op::SELECTION_MERGE)
                .op(merge)
                .op(0) // SelectionControl::None
                .write(&mut self.code);
        }

        match terminator {
            Terminator::Branch { target } => {
                Instruction::new(op::BRANCH)
                    .op(ctx.block_ids[target.index()])
                    .write(&mut self.code);
            }
            Terminator::BranchIf {
                condition,
                then_block,
                else_block,
            } => {
                Instruction::new(op::BRANCH_CONDITIONAL)
                    .op(ctx.get(*condition))
                    .op(ctx.block_ids[then_block.index()])
                    .op(ctx.block_ids[else_block.index()])
                    .write(&mut self.code);
            }
            Terminator::Switch {
                selector,
                cases,
                default,
            } => {
                let mut inst = Instruction::new(op::SWITCH)
                    .op(ctx.get(*selector))
                    .op(ctx.block_ids[default.index()]);
                for case in cases {
                    inst = inst
                        .op(case.selector as u32)
                        .op(ctx.block_ids[case.block.index()]);
                }
                inst.write(&mut self.code);
            }
            Terminator::Return { value } => {
                if ctx.is_entry {
                    if let (Some(value), Some(out)) = (value, ctx.output_var) {
                        Instruction::new(op::STORE)
                            .op(out)
                            .op(ctx.get(*value))
                            .write(&mut self.code);
                    }
                    Instruction::new(op::RETURN).write(&mut self.code);
                } else {
                    match value {
                        Some(value) => {
                            Instruction::new(op::RETURN_VALUE)
                                .op(ctx.get(*value))
                                .write(&mut self.code);
                        }
                        None => Instruction::new(op::RETURN).write(&mut self.code),
                    }
                }
            }
            Terminator::Discard => {
                Instruction::new(op::KILL).write(&mut self.code);
            }
            Terminator::Unreachable => {
                Instruction::new(op::UNREACHABLE).write(&mut self.code);
            }
        }
        Ok(())
    }

    /// The label for a construct's merge block, synthesizing an
    /// unreachable block when the branches never reconverge.
    fn merge_id(&mut self, ctx: &mut FnCtx, ipdom: Option<usize>) -> u32 {
        match ipdom {
            Some(index) => ctx.block_ids[index],
            None => {
                let id = self.id();
                ctx.synth_blocks.push(id);
                id
            }
        }
    }
}

/// GLSL.std.450 instruction for a math builtin, choosing the float,
/// signed, or unsigned variant by the result's scalar kind.
fn ext_inst_for(fun: Builtin, kind: ScalarKind) -> Option<u32> {
    use Builtin as B;
    use ScalarKind as K;
    Some(match fun {
        B::Abs if kind == K::Float => glsl450::F_ABS,
        B::Abs => glsl450::S_ABS,
        B::Min => match kind {
            K::Float => glsl450::F_MIN,
            K::Uint => glsl450::U_MIN,
            _ => glsl450::S_MIN,
        },
        B::Max => match kind {
            K::Float => glsl450::F_MAX,
            K::Uint => glsl450::U_MAX,
            _ => glsl450::S_MAX,
        },
        B::Clamp => match kind {
            K::Float => glsl450::F_CLAMP,
            K::Uint => glsl450::U_CLAMP,
            _ => glsl450::S_CLAMP,
        },
        B::Sign if kind == K::Float => glsl450::F_SIGN,
        B::Sign => glsl450::S_SIGN,
        B::Floor => glsl450::FLOOR,
        B::Ceil => glsl450::CEIL,
        B::Round => glsl450::ROUND,
        B::Fract => glsl450::FRACT,
        B::Trunc => glsl450::TRUNC,
        B::Sin => glsl450::SIN,
        B::Cos => glsl450::COS,
        B::Tan => glsl450::TAN,
        B::Asin => glsl450::ASIN,
        B::Acos => glsl450::ACOS,
        B::Atan => glsl450::ATAN,
        B::Atan2 => glsl450::ATAN2,
        B::Sinh => glsl450::SINH,
        B::Cosh => glsl450::COSH,
        B::Tanh => glsl450::TANH,
        B::Sqrt => glsl450::SQRT,
        B::InverseSqrt => glsl450::INVERSE_SQRT,
        B::Log => glsl450::LOG,
        B::Log2 => glsl450::LOG2,
        B::Exp => glsl450::EXP,
        B::Exp2 => glsl450::EXP2,
        B::Pow => glsl450::POW,
        B::Cross => glsl450::CROSS,
        B::Normalize => glsl450::NORMALIZE,
        B::Length => glsl450::LENGTH,
        B::Distance => glsl450::DISTANCE,
        B::Mix => glsl450::F_MIX,
        B::Step => glsl450::STEP,
        B::SmoothStep => glsl450::SMOOTH_STEP,
        B::Fma => glsl450::FMA,
        _ => return None,
    })
}

/// Per-function emission state.
struct FnCtx {
    handle: Handle<Function>,
    value_ids: Vec<Option<u32>>,
    block_ids: Vec<u32>,
    local_ids: Vec<u32>,
    param_ids: Vec<u32>,
    /// Entry-point parameter Input variables with their type ids.
    input_vars: Vec<(u32, u32)>,
    output_var: Option<u32>,
    is_entry: bool,
    /// Pointer values that unwrap a Block-wrapped buffer, keyed to the
    /// variable id `OpArrayLength` needs.
    buffer_roots: HashMap<Handle<Value>, u32>,
    /// Labels for synthesized unreachable merge blocks.
    synth_blocks: Vec<u32>,
}

impl FnCtx {
    fn bind(&mut self, value: Option<Handle<Value>>, id: u32) {
        if let Some(value) = value {
            self.value_ids[value.index()] = Some(id);
        }
    }

    fn get(&self, value: Handle<Value>) -> u32 {
        self.value_ids[value.index()]
            .expect("value defined before use; lowering emits defs in order")
    }
}

/// Control-flow structure recovered from the block graph: loop headers
/// (targets of back edges) and immediate post-dominators used as merge
/// blocks.
struct Structure {
    loop_headers: HashSet<usize>,
    /// For each loop header, the back-edge source used as the continue
    /// target. With several back edges the highest-numbered block wins,
    /// which is the loop's own continuing block in this lowering.
    continue_source: HashMap<usize, usize>,
    ipdom: Vec<Option<usize>>,
}

impl Structure {
    fn analyze(f: &Function) -> Self {
        let count = f.blocks.len();
        let successors: Vec<Vec<usize>> = f
            .blocks
            .iter()
            .map(|(_, block)| match &block.terminator {
                Terminator::Branch { target } => vec![target.index()],
                Terminator::BranchIf {
                    then_block,
                    else_block,
                    ..
                } => vec![then_block.index(), else_block.index()],
                Terminator::Switch { cases, default, .. } => {
                    let mut out: Vec<usize> = cases.iter().map(|c| c.block.index()).collect();
                    out.push(default.index());
                    out
                }
                Terminator::Return { .. } | Terminator::Discard | Terminator::Unreachable => {
                    Vec::new()
                }
            })
            .collect();

        // Back edges via DFS from the entry block.
        let mut loop_headers = HashSet::new();
        let mut continue_source = HashMap::new();
        let mut state = vec![0u8; count]; // 0 unvisited, 1 on stack, 2 done
        let mut stack = vec![(f.entry.index(), 0usize)];
        state[f.entry.index()] = 1;
        while let Some(frame) = stack.last_mut() {
            let block = frame.0;
            if frame.1 < successors[block].len() {
                let successor = successors[block][frame.1];
                frame.1 += 1;
                match state[successor] {
                    0 => {
                        state[successor] = 1;
                        stack.push((successor, 0));
                    }
                    1 => {
                        loop_headers.insert(successor);
                        let entry = continue_source.entry(successor).or_insert(block);
                        *entry = (*entry).max(block);
                    }
                    _ => {}
                }
            } else {
                state[block] = 2;
                stack.pop();
            }
        }

        // Post-dominator sets by iteration; block graphs are small.
        let all: HashSet<usize> = (0..count).collect();
        let mut pdom: Vec<HashSet<usize>> = (0..count)
            .map(|b| {
                if successors[b].is_empty() {
                    HashSet::from([b])
                } else {
                    all.clone()
                }
            })
            .collect();
        let mut changed = true;
        while changed {
            changed = false;
            for b in (0..count).rev() {
                if successors[b].is_empty() {
                    continue;
                }
                let mut meet: Option<HashSet<usize>> = None;
                for &s in &successors[b] {
                    meet = Some(match meet {
                        None => pdom[s].clone(),
                        Some(acc) => acc.intersection(&pdom[s]).copied().collect(),
                    });
                }
                let mut next = meet.unwrap_or_default();
                next.insert(b);
                if next != pdom[b] {
                    pdom[b] = next;
                    changed = true;
                }
            }
        }
        // The immediate post-dominator is the candidate with the largest
        // own set: sets are nested along the post-dominator tree path.
        let ipdom = (0..count)
            .map(|b| {
                pdom[b]
                    .iter()
                    .filter(|&&c| c != b)
                    .max_by_key(|&&c| pdom[c].len())
                    .copied()
            })
            .collect();

        Self {
            loop_headers,
            continue_source,
            ipdom,
        }
    }
}
