//! @ai:module:intent Problem collaborator boundary: test cases, FLOP counts, extra parameters
//! @ai:module:layer domain
//! @ai:module:public_api Problem, TestCase, TensorSpec, ScalarValue, CaseBuffers
//! @ai:module:stateless true

use crate::device::{Device, DeviceBuffer, ElementType};
use crate::error::DeviceError;
use crate::native::EntryPointSignature;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// @ai:intent A scalar argument value before it is cast to the entry point's declared type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Int(i64),
    Float(f64),
}

/// @ai:intent Shape and element type of one tensor argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub shape: Vec<usize>,
    #[serde(default = "default_element_type")]
    pub element_type: ElementType,
}

impl TensorSpec {
    /// @ai:intent A float32 tensor of the given shape
    /// @ai:effects pure
    pub fn f32(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            element_type: ElementType::Float32,
        }
    }

    /// @ai:intent Number of elements
    /// @ai:effects pure
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn default_element_type() -> ElementType {
    ElementType::Float32
}

/// @ai:intent One externally defined test case; read-only to the judge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub inputs: Vec<TensorSpec>,
    pub output: TensorSpec,
    #[serde(default)]
    pub params: BTreeMap<String, ScalarValue>,
}

/// @ai:intent Device buffers for one test case, in argument order
pub struct CaseBuffers {
    pub inputs: Vec<Box<dyn DeviceBuffer>>,
    pub output: Box<dyn DeviceBuffer>,
}

impl CaseBuffers {
    /// @ai:intent Borrow the input buffers as trait objects
    /// @ai:effects pure
    pub fn input_refs(&self) -> Vec<&dyn DeviceBuffer> {
        self.inputs.iter().map(|b| b.as_ref()).collect()
    }
}

/// @ai:intent Capability a problem definition exposes to the judge
pub trait Problem: Send + Sync {
    fn name(&self) -> &str;

    /// @ai:intent Declared argument kinds of the submission's entry point
    fn signature(&self) -> EntryPointSignature;

    fn test_cases(&self) -> Vec<TestCase>;

    /// @ai:intent Ordered scalar parameters appended after the output buffer
    fn extra_params(&self, test_case: &TestCase) -> Vec<ScalarValue>;

    /// @ai:intent Floating-point operation count of one kernel call
    fn flops(&self, test_case: &TestCase) -> f64;

    /// @ai:intent Allocate (and optionally fill) the buffers for a test case
    /// @ai:effects device
    fn create_buffers(&self, device: &dyn Device, test_case: &TestCase) -> Result<CaseBuffers, DeviceError> {
        let inputs = test_case
            .inputs
            .iter()
            .map(|spec| device.allocate(spec.element_type, spec.len()))
            .collect::<Result<Vec<_>, _>>()?;
        let output = device.allocate(test_case.output.element_type, test_case.output.len())?;

        Ok(CaseBuffers { inputs, output })
    }
}
