//! @ai:module:intent Convert problem buffers and scalars into a call-ready argument list
//! @ai:module:layer infrastructure
//! @ai:module:public_api CallArgs, ArgValue, BoundCall
//! @ai:module:stateless true
//!
//! All raw-pointer and calling-convention handling for submitted code lives
//! in this file. Everything outside it works with safe values.

use crate::benchmark::KernelCall;
use crate::device::DeviceBuffer;
use crate::error::AdapterError;
use crate::native::loader::LoadedModule;
use crate::native::signature::{ArgKind, EntryPointSignature, ScalarType};
use crate::problem::ScalarValue;
use libffi::middle::{Arg, Cif, CodePtr, Type};
use std::ffi::c_void;

/// @ai:intent One argument already cast to its declared C type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgValue {
    Pointer(*mut c_void),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl ArgValue {
    /// @ai:intent Cast a scalar the way a C declaration would receive it
    /// @ai:effects pure
    pub fn cast(value: ScalarValue, ty: ScalarType) -> Self {
        match (value, ty) {
            (ScalarValue::Int(v), ScalarType::I32) => ArgValue::I32(v as i32),
            (ScalarValue::Int(v), ScalarType::I64) => ArgValue::I64(v),
            (ScalarValue::Int(v), ScalarType::U32) => ArgValue::U32(v as u32),
            (ScalarValue::Int(v), ScalarType::U64) => ArgValue::U64(v as u64),
            (ScalarValue::Int(v), ScalarType::F32) => ArgValue::F32(v as f32),
            (ScalarValue::Int(v), ScalarType::F64) => ArgValue::F64(v as f64),
            (ScalarValue::Float(v), ScalarType::I32) => ArgValue::I32(v as i32),
            (ScalarValue::Float(v), ScalarType::I64) => ArgValue::I64(v as i64),
            (ScalarValue::Float(v), ScalarType::U32) => ArgValue::U32(v as u32),
            (ScalarValue::Float(v), ScalarType::U64) => ArgValue::U64(v as u64),
            (ScalarValue::Float(v), ScalarType::F32) => ArgValue::F32(v as f32),
            (ScalarValue::Float(v), ScalarType::F64) => ArgValue::F64(v),
        }
    }

    fn as_ffi_arg(&self) -> Arg {
        match self {
            ArgValue::Pointer(p) => Arg::new(p),
            ArgValue::I32(v) => Arg::new(v),
            ArgValue::I64(v) => Arg::new(v),
            ArgValue::U32(v) => Arg::new(v),
            ArgValue::U64(v) => Arg::new(v),
            ArgValue::F32(v) => Arg::new(v),
            ArgValue::F64(v) => Arg::new(v),
        }
    }
}

fn ffi_type(kind: &ArgKind) -> Type {
    match kind {
        ArgKind::Input(_) | ArgKind::Output(_) => Type::pointer(),
        ArgKind::Scalar(ScalarType::I32) => Type::i32(),
        ArgKind::Scalar(ScalarType::I64) => Type::i64(),
        ArgKind::Scalar(ScalarType::U32) => Type::u32(),
        ArgKind::Scalar(ScalarType::U64) => Type::u64(),
        ArgKind::Scalar(ScalarType::F32) => Type::f32(),
        ArgKind::Scalar(ScalarType::F64) => Type::f64(),
    }
}

/// @ai:intent Argument list in entry-point order: inputs, output, extra scalars
pub struct CallArgs {
    values: Vec<ArgValue>,
    cif: Cif,
}

impl std::fmt::Debug for CallArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallArgs").field("values", &self.values).finish()
    }
}

impl CallArgs {
    /// @ai:intent Lay out `inputs`, `output` and `extras` against the declared kinds
    /// @ai:pre buffers stay alive for as long as the returned arguments are used
    /// @ai:post len == signature.arity()
    /// @ai:effects pure
    pub fn prepare(
        signature: &EntryPointSignature,
        inputs: &[&dyn DeviceBuffer],
        output: &dyn DeviceBuffer,
        extras: &[ScalarValue],
    ) -> Result<Self, AdapterError> {
        let supplied = inputs.len() + 1 + extras.len();
        if supplied != signature.arity() {
            return Err(AdapterError::ArityMismatch {
                expected: signature.arity(),
                inputs: inputs.len(),
                scalars: extras.len(),
            });
        }

        let mut values = Vec::with_capacity(supplied);

        for (index, buffer) in inputs.iter().enumerate() {
            values.push(pointer_for(signature, index, *buffer, false)?);
        }
        values.push(pointer_for(signature, inputs.len(), output, true)?);

        let scalar_base = inputs.len() + 1;
        for (offset, value) in extras.iter().enumerate() {
            let index = scalar_base + offset;
            match signature.args[index] {
                ArgKind::Scalar(ty) => values.push(ArgValue::cast(*value, ty)),
                declared => {
                    return Err(AdapterError::KindMismatch {
                        index,
                        declared: declared.to_string(),
                        supplied: "scalar",
                    })
                }
            }
        }

        let cif = Cif::new(signature.args.iter().map(ffi_type), Type::void());

        Ok(Self { values, cif })
    }

    /// @ai:intent Cast values in call order
    /// @ai:effects pure
    pub fn values(&self) -> &[ArgValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn pointer_for(
    signature: &EntryPointSignature,
    index: usize,
    buffer: &dyn DeviceBuffer,
    is_output: bool,
) -> Result<ArgValue, AdapterError> {
    let declared = signature.args[index];
    let supplied = if is_output { "output buffer" } else { "input buffer" };

    let element_type = match (declared, is_output) {
        (ArgKind::Input(ty), false) | (ArgKind::Output(ty), true) => ty,
        _ => {
            return Err(AdapterError::KindMismatch {
                index,
                declared: declared.to_string(),
                supplied,
            })
        }
    };

    if element_type != buffer.element_type() {
        return Err(AdapterError::KindMismatch {
            index,
            declared: declared.to_string(),
            supplied: if is_output {
                "output buffer of another element type"
            } else {
                "input buffer of another element type"
            },
        });
    }

    Ok(ArgValue::Pointer(buffer.as_ptr()))
}

/// @ai:intent An entry point paired with its prepared arguments
pub struct BoundCall<'m> {
    module: &'m LoadedModule,
    args: CallArgs,
}

impl<'m> BoundCall<'m> {
    /// @ai:intent Bind arguments to a module's entry point
    ///
    /// # Safety
    ///
    /// The module's declared signature must match the exported function, and
    /// every buffer behind a pointer argument must outlive the returned value.
    pub unsafe fn new(module: &'m LoadedModule, args: CallArgs) -> Self {
        Self { module, args }
    }

    /// @ai:intent Invoke the entry point once
    /// @ai:effects native code
    pub fn invoke(&self) {
        let args: Vec<Arg> = self.args.values.iter().map(ArgValue::as_ffi_arg).collect();
        // Safety: upheld by the contract of `BoundCall::new`
        unsafe {
            self.args
                .cif
                .call::<()>(CodePtr::from_ptr(self.module.entry_ptr()), &args);
        }
    }
}

impl KernelCall for BoundCall<'_> {
    fn call(&mut self) {
        self.invoke();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ElementType, HostBuffer};
    use crate::native::loader::load;
    use crate::test_support::{build_host_library, host_cc_available};

    fn vector_add_signature() -> EntryPointSignature {
        EntryPointSignature::new(vec![
            ArgKind::Input(ElementType::Float32),
            ArgKind::Input(ElementType::Float32),
            ArgKind::Output(ElementType::Float32),
            ArgKind::Scalar(ScalarType::U64),
        ])
    }

    #[test]
    fn test_prepare_orders_pointers_then_scalars() {
        let a = HostBuffer::from_f32(&[1.0]);
        let b = HostBuffer::from_f32(&[2.0]);
        let c = HostBuffer::zeroed(ElementType::Float32, 1);

        let args = CallArgs::prepare(
            &vector_add_signature(),
            &[&a, &b],
            &c,
            &[ScalarValue::Int(1)],
        )
        .unwrap();

        assert_eq!(
            args.values(),
            &[
                ArgValue::Pointer(a.as_ptr()),
                ArgValue::Pointer(b.as_ptr()),
                ArgValue::Pointer(c.as_ptr()),
                ArgValue::U64(1),
            ]
        );
    }

    #[test]
    fn test_arity_mismatch() {
        let a = HostBuffer::from_f32(&[1.0]);
        let c = HostBuffer::zeroed(ElementType::Float32, 1);

        let err = CallArgs::prepare(&vector_add_signature(), &[&a], &c, &[ScalarValue::Int(1)])
            .unwrap_err();

        assert_eq!(
            err,
            AdapterError::ArityMismatch {
                expected: 4,
                inputs: 1,
                scalars: 1
            }
        );
    }

    #[test]
    fn test_scalar_in_pointer_slot_is_rejected() {
        let a = HostBuffer::from_f32(&[1.0]);
        let c = HostBuffer::zeroed(ElementType::Float32, 1);

        // right count, wrong shape: 1 input + output + 2 scalars against 2 inputs + output + 1 scalar
        let err = CallArgs::prepare(
            &vector_add_signature(),
            &[&a],
            &c,
            &[ScalarValue::Int(1), ScalarValue::Int(2)],
        )
        .unwrap_err();

        assert!(matches!(err, AdapterError::KindMismatch { index: 1, .. }));
    }

    #[test]
    fn test_element_type_must_match_declaration() {
        let a = HostBuffer::zeroed(ElementType::Float16, 1);
        let b = HostBuffer::from_f32(&[2.0]);
        let c = HostBuffer::zeroed(ElementType::Float32, 1);

        let err = CallArgs::prepare(&vector_add_signature(), &[&a, &b], &c, &[ScalarValue::Int(1)])
            .unwrap_err();

        assert!(matches!(err, AdapterError::KindMismatch { index: 0, .. }));
    }

    #[test]
    fn test_scalar_casts() {
        assert_eq!(ArgValue::cast(ScalarValue::Float(2.75), ScalarType::I32), ArgValue::I32(2));
        assert_eq!(ArgValue::cast(ScalarValue::Int(3), ScalarType::F32), ArgValue::F32(3.0));
        assert_eq!(ArgValue::cast(ScalarValue::Int(-1), ScalarType::I64), ArgValue::I64(-1));
        assert_eq!(ArgValue::cast(ScalarValue::Float(0.5), ScalarType::F64), ArgValue::F64(0.5));
    }

    #[test]
    fn test_bound_call_runs_native_code() {
        if !host_cc_available() {
            return;
        }
        let bytes = build_host_library(
            "#include <stddef.h>\n\
             void solution(const float* a, const float* b, float* c, size_t n, float scale) {\n\
                 for (size_t i = 0; i < n; i++) c[i] = (a[i] + b[i]) * scale;\n\
             }",
        );
        let mut signature = vector_add_signature();
        signature.args.push(ArgKind::Scalar(ScalarType::F32));
        let module = load(&bytes, signature).unwrap();

        let a = HostBuffer::from_f32(&[1.0, 2.0, 3.0]);
        let b = HostBuffer::from_f32(&[10.0, 20.0, 30.0]);
        let c = HostBuffer::zeroed(ElementType::Float32, 3);

        let args = CallArgs::prepare(
            module.signature(),
            &[&a, &b],
            &c,
            &[ScalarValue::Int(3), ScalarValue::Float(2.0)],
        )
        .unwrap();
        let call = unsafe { BoundCall::new(&module, args) };
        call.invoke();

        assert_eq!(c.to_f32_vec().unwrap(), vec![22.0, 44.0, 66.0]);
    }
}
