//! The interchange document model. Field names follow the ONNX protobuf
//! schema. Files are ONNX protobuf bytes; JSON is kept as a readable dump.

use crate::wire;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tessel_core::{
    dtype::DType,
    error::{Error, Result},
};
use tessel_tensor::RawTensor;

pub const IR_VERSION: i64 = 6;
pub const OPSET_VERSION: i64 = 11;
pub const PRODUCER_NAME: &str = "tessel";

/// Element types of the interchange format that can be exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElemType {
    Float,
    Int32,
    Int64,
    Bool,
}

impl ElemType {
    /// `TensorProto.DataType` code.
    pub fn code(&self) -> i32 {
        match self {
            ElemType::Float => 1,
            ElemType::Int32 => 6,
            ElemType::Int64 => 7,
            ElemType::Bool => 9,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            1 => Ok(ElemType::Float),
            6 => Ok(ElemType::Int32),
            7 => Ok(ElemType::Int64),
            9 => Ok(ElemType::Bool),
            _ => Err(Error::NotSupported(format!("element type code {}", code))),
        }
    }

    pub fn from_dtype(dtype: DType) -> Self {
        match dtype {
            DType::F32 => ElemType::Float,
            DType::I32 => ElemType::Int32,
            DType::BOOL => ElemType::Bool,
        }
    }

    /// Native dtype a payload of this type is loaded as. 64-bit integers are
    /// narrowed.
    pub fn to_dtype(&self) -> DType {
        match self {
            ElemType::Float => DType::F32,
            ElemType::Int32 | ElemType::Int64 => DType::I32,
            ElemType::Bool => DType::BOOL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorProto {
    pub name: String,
    pub data_type: ElemType,
    pub dims: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub float_data: Vec<f32>,
    /// Also carries `BOOL` payloads as 0/1.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub int32_data: Vec<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub int64_data: Vec<i64>,
}

impl TensorProto {
    pub fn from_f32(name: impl Into<String>, dims: &[usize], values: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            data_type: ElemType::Float,
            dims: dims.iter().map(|&d| d as i64).collect(),
            float_data: values,
            int32_data: Vec::new(),
            int64_data: Vec::new(),
        }
    }

    pub fn from_i64(name: impl Into<String>, dims: &[usize], values: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            data_type: ElemType::Int64,
            dims: dims.iter().map(|&d| d as i64).collect(),
            float_data: Vec::new(),
            int32_data: Vec::new(),
            int64_data: values,
        }
    }

    pub fn from_raw(name: impl Into<String>, raw: &RawTensor) -> Self {
        let mut proto = Self::from_f32(name, raw.shape(), Vec::new());
        match raw.dtype() {
            DType::F32 => proto.float_data = raw.to_vec_f32(),
            DType::I32 => {
                proto.data_type = ElemType::Int32;
                proto.int32_data = raw.to_vec_i32();
            }
            DType::BOOL => {
                proto.data_type = ElemType::Bool;
                proto.int32_data = raw.to_vec_bool().into_iter().map(i32::from).collect();
            }
        }
        proto
    }

    pub fn shape(&self) -> Result<Vec<usize>> {
        self.dims
            .iter()
            .map(|&d| {
                usize::try_from(d).map_err(|_| Error::shape(format!("negative extent {} in tensor {}", d, self.name)))
            })
            .collect()
    }

    pub fn element_count(&self) -> Result<usize> {
        Ok(self.shape()?.iter().product())
    }

    /// Number of values stored in the field matching `data_type`.
    pub fn payload_len(&self) -> usize {
        match self.data_type {
            ElemType::Float => self.float_data.len(),
            ElemType::Int32 | ElemType::Bool => self.int32_data.len(),
            ElemType::Int64 => self.int64_data.len(),
        }
    }

    /// Materializes the payload. `INT64` is narrowed to `I32`.
    pub fn to_raw(&self) -> Result<RawTensor> {
        let shape = self.shape()?;
        let expected: usize = shape.iter().product();
        if self.payload_len() != expected {
            return Err(Error::shape(format!(
                "tensor {} declares {:?} but stores {} values",
                self.name,
                shape,
                self.payload_len()
            )));
        }
        match self.data_type {
            ElemType::Float => RawTensor::from_vec(self.float_data.clone(), &shape),
            ElemType::Int32 => RawTensor::from_vec(self.int32_data.clone(), &shape),
            ElemType::Int64 => {
                let narrowed = self
                    .int64_data
                    .iter()
                    .map(|&v| {
                        i32::try_from(v)
                            .map_err(|_| Error::InvalidArgument(format!("{} does not fit in 32 bits ({})", v, self.name)))
                    })
                    .collect::<Result<Vec<_>>>()?;
                RawTensor::from_vec(narrowed, &shape)
            }
            ElemType::Bool => RawTensor::from_vec(self.int32_data.iter().map(|&v| v != 0).collect::<Vec<_>>(), &shape),
        }
    }

    /// First value as `f32`, whatever the storage type.
    pub fn first_f32(&self) -> Option<f32> {
        match self.data_type {
            ElemType::Float => self.float_data.first().copied(),
            ElemType::Int32 | ElemType::Bool => self.int32_data.first().map(|&v| v as f32),
            ElemType::Int64 => self.int64_data.first().map(|&v| v as f32),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Float(f32),
    Int(i64),
    String(String),
    Tensor(TensorProto),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
}

impl AttributeValue {
    pub fn as_float(&self) -> Option<f32> {
        match self {
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            AttributeValue::Ints(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&TensorProto> {
        match self {
            AttributeValue::Tensor(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeProto {
    pub name: String,
    pub value: AttributeValue,
}

impl AttributeProto {
    pub fn new(name: impl Into<String>, value: AttributeValue) -> Self {
        Self { name: name.into(), value }
    }

    pub fn float(name: impl Into<String>, value: f32) -> Self {
        Self::new(name, AttributeValue::Float(value))
    }

    pub fn int(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, AttributeValue::Int(value))
    }

    pub fn ints(name: impl Into<String>, values: Vec<i64>) -> Self {
        Self::new(name, AttributeValue::Ints(values))
    }

    pub fn tensor(name: impl Into<String>, value: TensorProto) -> Self {
        Self::new(name, AttributeValue::Tensor(value))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeProto {
    pub name: String,
    pub op_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
    /// Empty names mark omitted optional inputs.
    #[serde(default)]
    pub input: Vec<String>,
    #[serde(default)]
    pub output: Vec<String>,
    #[serde(default)]
    pub attribute: Vec<AttributeProto>,
}

impl NodeProto {
    pub fn new(name: impl Into<String>, op_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op_type: op_type.into(),
            ..Default::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&AttributeValue> {
        self.attribute.iter().find(|a| a.name == name).map(|a| &a.value)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn with_attr(mut self, attr: AttributeProto) -> Self {
        self.attribute.push(attr);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueInfoProto {
    pub name: String,
    pub elem_type: ElemType,
    /// Non-positive extents are dynamic.
    pub shape: Vec<i64>,
}

impl ValueInfoProto {
    pub fn new(name: impl Into<String>, elem_type: ElemType, shape: &[usize]) -> Self {
        Self {
            name: name.into(),
            elem_type,
            shape: shape.iter().map(|&d| d as i64).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphProto {
    pub name: String,
    #[serde(default)]
    pub node: Vec<NodeProto>,
    #[serde(default)]
    pub input: Vec<ValueInfoProto>,
    #[serde(default)]
    pub output: Vec<ValueInfoProto>,
    #[serde(default)]
    pub initializer: Vec<TensorProto>,
}

impl GraphProto {
    pub fn initializer(&self, name: &str) -> Option<&TensorProto> {
        self.initializer.iter().find(|t| t.name == name)
    }

    /// Graph inputs with no initializer, i.e. the ones bound at run time.
    pub fn runtime_inputs(&self) -> impl Iterator<Item = &ValueInfoProto> {
        self.input.iter().filter(|x| self.initializer(&x.name).is_none())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorSetId {
    /// Empty for the default domain.
    #[serde(default)]
    pub domain: String,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProto {
    pub ir_version: i64,
    #[serde(default)]
    pub producer_name: String,
    #[serde(default)]
    pub opset_import: Vec<OperatorSetId>,
    pub graph: GraphProto,
}

impl ModelProto {
    pub fn new(graph: GraphProto) -> Self {
        Self {
            ir_version: IR_VERSION,
            producer_name: PRODUCER_NAME.to_string(),
            opset_import: vec![OperatorSetId {
                domain: String::new(),
                version: OPSET_VERSION,
            }],
            graph,
        }
    }

    /// Version of the default-domain operator set, if declared.
    pub fn default_opset(&self) -> Option<i64> {
        self.opset_import
            .iter()
            .find(|o| o.domain.is_empty() || o.domain == "ai.onnx")
            .map(|o| o.version)
    }

    /// Encodes the model as an ONNX protobuf message.
    pub fn to_bytes(&self) -> Vec<u8> {
        wire::encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        wire::decode(bytes)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize model to JSON: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(format!("Failed to deserialize model from JSON: {}", e)))
    }

    /// Writes an `.onnx` file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_bytes())?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(&fs::read(path)?)
    }
}
