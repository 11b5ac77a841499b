//! Protobuf messages of `onnx.proto`, restricted to the fields the document
//! model carries, and the conversions to and from it.

use crate::proto::{self, AttributeValue, ElemType};
use prost::{Message, Oneof};
use tessel_core::error::{Error, Result};

#[derive(Clone, PartialEq, Message)]
pub struct ModelProto {
    #[prost(int64, optional, tag = "1")]
    pub ir_version: Option<i64>,
    #[prost(message, repeated, tag = "8")]
    pub opset_import: Vec<OperatorSetIdProto>,
    #[prost(string, optional, tag = "2")]
    pub producer_name: Option<String>,
    #[prost(message, optional, tag = "7")]
    pub graph: Option<GraphProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OperatorSetIdProto {
    #[prost(string, optional, tag = "1")]
    pub domain: Option<String>,
    #[prost(int64, optional, tag = "2")]
    pub version: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GraphProto {
    #[prost(message, repeated, tag = "1")]
    pub node: Vec<NodeProto>,
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(message, repeated, tag = "5")]
    pub initializer: Vec<TensorProto>,
    #[prost(message, repeated, tag = "11")]
    pub input: Vec<ValueInfoProto>,
    #[prost(message, repeated, tag = "12")]
    pub output: Vec<ValueInfoProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NodeProto {
    #[prost(string, repeated, tag = "1")]
    pub input: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub output: Vec<String>,
    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub op_type: Option<String>,
    #[prost(message, repeated, tag = "5")]
    pub attribute: Vec<AttributeProto>,
    #[prost(string, optional, tag = "7")]
    pub domain: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AttributeProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(int32, optional, tag = "20")]
    pub r#type: Option<i32>,
    #[prost(float, optional, tag = "2")]
    pub f: Option<f32>,
    #[prost(int64, optional, tag = "3")]
    pub i: Option<i64>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub s: Option<Vec<u8>>,
    #[prost(message, optional, tag = "5")]
    pub t: Option<TensorProto>,
    #[prost(float, repeated, packed = "false", tag = "7")]
    pub floats: Vec<f32>,
    #[prost(int64, repeated, packed = "false", tag = "8")]
    pub ints: Vec<i64>,
    #[prost(bytes = "vec", repeated, tag = "9")]
    pub strings: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TensorProto {
    #[prost(int64, repeated, packed = "false", tag = "1")]
    pub dims: Vec<i64>,
    #[prost(int32, optional, tag = "2")]
    pub data_type: Option<i32>,
    #[prost(float, repeated, tag = "4")]
    pub float_data: Vec<f32>,
    #[prost(int32, repeated, tag = "5")]
    pub int32_data: Vec<i32>,
    #[prost(int64, repeated, tag = "7")]
    pub int64_data: Vec<i64>,
    #[prost(string, optional, tag = "8")]
    pub name: Option<String>,
    /// Little-endian values, used by most exporters instead of the typed fields.
    #[prost(bytes = "vec", optional, tag = "9")]
    pub raw_data: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ValueInfoProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(message, optional, tag = "2")]
    pub r#type: Option<TypeProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TypeProto {
    #[prost(oneof = "TypeValue", tags = "1")]
    pub value: Option<TypeValue>,
}

#[derive(Clone, PartialEq, Oneof)]
pub enum TypeValue {
    #[prost(message, tag = "1")]
    TensorType(TensorTypeProto),
}

#[derive(Clone, PartialEq, Message)]
pub struct TensorTypeProto {
    #[prost(int32, optional, tag = "1")]
    pub elem_type: Option<i32>,
    #[prost(message, optional, tag = "2")]
    pub shape: Option<TensorShapeProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TensorShapeProto {
    #[prost(message, repeated, tag = "1")]
    pub dim: Vec<Dimension>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Dimension {
    #[prost(oneof = "DimensionValue", tags = "1, 2")]
    pub value: Option<DimensionValue>,
}

#[derive(Clone, PartialEq, Oneof)]
pub enum DimensionValue {
    #[prost(int64, tag = "1")]
    DimValue(i64),
    #[prost(string, tag = "2")]
    DimParam(String),
}

// AttributeProto.AttributeType codes
const ATTR_FLOAT: i32 = 1;
const ATTR_INT: i32 = 2;
const ATTR_STRING: i32 = 3;
const ATTR_TENSOR: i32 = 4;
const ATTR_FLOATS: i32 = 6;
const ATTR_INTS: i32 = 7;
const ATTR_STRINGS: i32 = 8;

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| Error::Serialization(format!("attribute string is not UTF-8: {}", e)))
}

pub fn encode(model: &proto::ModelProto) -> Vec<u8> {
    ModelProto::from(model).encode_to_vec()
}

pub fn decode(bytes: &[u8]) -> Result<proto::ModelProto> {
    let message =
        ModelProto::decode(bytes).map_err(|e| Error::Serialization(format!("Failed to decode model: {}", e)))?;
    proto::ModelProto::try_from(message)
}

impl From<&proto::ModelProto> for ModelProto {
    fn from(model: &proto::ModelProto) -> Self {
        Self {
            ir_version: Some(model.ir_version),
            opset_import: model
                .opset_import
                .iter()
                .map(|o| OperatorSetIdProto {
                    domain: Some(o.domain.clone()),
                    version: Some(o.version),
                })
                .collect(),
            producer_name: non_empty(&model.producer_name),
            graph: Some(GraphProto::from(&model.graph)),
        }
    }
}

impl TryFrom<ModelProto> for proto::ModelProto {
    type Error = Error;

    fn try_from(model: ModelProto) -> Result<Self> {
        let graph = model
            .graph
            .ok_or_else(|| Error::Serialization("model carries no graph".to_string()))?;
        Ok(Self {
            ir_version: model.ir_version.unwrap_or_default(),
            producer_name: model.producer_name.unwrap_or_default(),
            opset_import: model
                .opset_import
                .into_iter()
                .map(|o| proto::OperatorSetId {
                    domain: o.domain.unwrap_or_default(),
                    version: o.version.unwrap_or_default(),
                })
                .collect(),
            graph: graph.try_into()?,
        })
    }
}

impl From<&proto::GraphProto> for GraphProto {
    fn from(graph: &proto::GraphProto) -> Self {
        Self {
            node: graph.node.iter().map(NodeProto::from).collect(),
            name: non_empty(&graph.name),
            initializer: graph.initializer.iter().map(TensorProto::from).collect(),
            input: graph.input.iter().map(ValueInfoProto::from).collect(),
            output: graph.output.iter().map(ValueInfoProto::from).collect(),
        }
    }
}

impl TryFrom<GraphProto> for proto::GraphProto {
    type Error = Error;

    fn try_from(graph: GraphProto) -> Result<Self> {
        Ok(Self {
            name: graph.name.unwrap_or_default(),
            node: graph.node.into_iter().map(TryInto::try_into).collect::<Result<_>>()?,
            input: graph.input.into_iter().map(TryInto::try_into).collect::<Result<_>>()?,
            output: graph.output.into_iter().map(TryInto::try_into).collect::<Result<_>>()?,
            initializer: graph.initializer.into_iter().map(TryInto::try_into).collect::<Result<_>>()?,
        })
    }
}

impl From<&proto::NodeProto> for NodeProto {
    fn from(node: &proto::NodeProto) -> Self {
        Self {
            input: node.input.clone(),
            output: node.output.clone(),
            name: non_empty(&node.name),
            op_type: Some(node.op_type.clone()),
            attribute: node.attribute.iter().map(AttributeProto::from).collect(),
            domain: non_empty(&node.domain),
        }
    }
}

impl TryFrom<NodeProto> for proto::NodeProto {
    type Error = Error;

    fn try_from(node: NodeProto) -> Result<Self> {
        Ok(Self {
            name: node.name.unwrap_or_default(),
            op_type: node
                .op_type
                .ok_or_else(|| Error::Serialization("node without op_type".to_string()))?,
            domain: node.domain.unwrap_or_default(),
            input: node.input,
            output: node.output,
            attribute: node.attribute.into_iter().map(TryInto::try_into).collect::<Result<_>>()?,
        })
    }
}

impl From<&proto::AttributeProto> for AttributeProto {
    fn from(attr: &proto::AttributeProto) -> Self {
        let mut out = Self {
            name: Some(attr.name.clone()),
            ..Default::default()
        };
        match &attr.value {
            AttributeValue::Float(v) => {
                out.r#type = Some(ATTR_FLOAT);
                out.f = Some(*v);
            }
            AttributeValue::Int(v) => {
                out.r#type = Some(ATTR_INT);
                out.i = Some(*v);
            }
            AttributeValue::String(v) => {
                out.r#type = Some(ATTR_STRING);
                out.s = Some(v.clone().into_bytes());
            }
            AttributeValue::Tensor(v) => {
                out.r#type = Some(ATTR_TENSOR);
                out.t = Some(TensorProto::from(v));
            }
            AttributeValue::Floats(v) => {
                out.r#type = Some(ATTR_FLOATS);
                out.floats = v.clone();
            }
            AttributeValue::Ints(v) => {
                out.r#type = Some(ATTR_INTS);
                out.ints = v.clone();
            }
            AttributeValue::Strings(v) => {
                out.r#type = Some(ATTR_STRINGS);
                out.strings = v.iter().map(|s| s.clone().into_bytes()).collect();
            }
        }
        out
    }
}

impl TryFrom<AttributeProto> for proto::AttributeProto {
    type Error = Error;

    fn try_from(attr: AttributeProto) -> Result<Self> {
        let name = attr.name.unwrap_or_default();
        // IR versions before 2 omit the type; fall back to whichever field is set.
        let kind = match attr.r#type {
            Some(kind) => kind,
            None if attr.f.is_some() => ATTR_FLOAT,
            None if attr.i.is_some() => ATTR_INT,
            None if attr.s.is_some() => ATTR_STRING,
            None if attr.t.is_some() => ATTR_TENSOR,
            None if !attr.floats.is_empty() => ATTR_FLOATS,
            None if !attr.strings.is_empty() => ATTR_STRINGS,
            None => ATTR_INTS,
        };
        let missing = || Error::Serialization(format!("attribute {} has no value", name));
        let value = match kind {
            ATTR_FLOAT => AttributeValue::Float(attr.f.ok_or_else(missing)?),
            ATTR_INT => AttributeValue::Int(attr.i.ok_or_else(missing)?),
            ATTR_STRING => AttributeValue::String(utf8(attr.s.ok_or_else(missing)?)?),
            ATTR_TENSOR => AttributeValue::Tensor(attr.t.ok_or_else(missing)?.try_into()?),
            ATTR_FLOATS => AttributeValue::Floats(attr.floats),
            ATTR_INTS => AttributeValue::Ints(attr.ints),
            ATTR_STRINGS => AttributeValue::Strings(attr.strings.into_iter().map(utf8).collect::<Result<_>>()?),
            other => {
                return Err(Error::NotSupported(format!(
                    "attribute {} has unsupported type code {}",
                    name, other
                )))
            }
        };
        Ok(Self { name, value })
    }
}

impl From<&proto::TensorProto> for TensorProto {
    fn from(tensor: &proto::TensorProto) -> Self {
        Self {
            dims: tensor.dims.clone(),
            data_type: Some(tensor.data_type.code()),
            float_data: tensor.float_data.clone(),
            int32_data: tensor.int32_data.clone(),
            int64_data: tensor.int64_data.clone(),
            name: non_empty(&tensor.name),
            raw_data: None,
        }
    }
}

impl TryFrom<TensorProto> for proto::TensorProto {
    type Error = Error;

    fn try_from(tensor: TensorProto) -> Result<Self> {
        let name = tensor.name.unwrap_or_default();
        let data_type = ElemType::from_code(tensor.data_type.unwrap_or_default())?;
        let mut out = Self {
            name,
            data_type,
            dims: tensor.dims,
            float_data: tensor.float_data,
            int32_data: tensor.int32_data,
            int64_data: tensor.int64_data,
        };
        if let Some(raw) = tensor.raw_data.filter(|raw| !raw.is_empty()) {
            unpack_raw(&mut out, &raw)?;
        }
        Ok(out)
    }
}

/// Moves a little-endian `raw_data` payload into the typed field for its type.
fn unpack_raw(tensor: &mut proto::TensorProto, raw: &[u8]) -> Result<()> {
    let width = match tensor.data_type {
        ElemType::Float | ElemType::Int32 => 4,
        ElemType::Int64 => 8,
        ElemType::Bool => 1,
    };
    if raw.len() % width != 0 {
        return Err(Error::Serialization(format!(
            "raw payload of {} holds {} bytes, not a multiple of {}",
            tensor.name,
            raw.len(),
            width
        )));
    }
    match tensor.data_type {
        ElemType::Float => {
            tensor.float_data = raw
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        }
        ElemType::Int32 => {
            tensor.int32_data = raw
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        }
        ElemType::Int64 => {
            tensor.int64_data = raw
                .chunks_exact(8)
                .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect()
        }
        ElemType::Bool => tensor.int32_data = raw.iter().map(|&b| i32::from(b != 0)).collect(),
    }
    Ok(())
}

impl From<&proto::ValueInfoProto> for ValueInfoProto {
    fn from(info: &proto::ValueInfoProto) -> Self {
        let dim = info
            .shape
            .iter()
            .enumerate()
            .map(|(i, &d)| Dimension {
                value: Some(if d > 0 {
                    DimensionValue::DimValue(d)
                } else {
                    DimensionValue::DimParam(format!("{}_{}", info.name, i))
                }),
            })
            .collect();
        Self {
            name: Some(info.name.clone()),
            r#type: Some(TypeProto {
                value: Some(TypeValue::TensorType(TensorTypeProto {
                    elem_type: Some(info.elem_type.code()),
                    shape: Some(TensorShapeProto { dim }),
                })),
            }),
        }
    }
}

impl TryFrom<ValueInfoProto> for proto::ValueInfoProto {
    type Error = Error;

    fn try_from(info: ValueInfoProto) -> Result<Self> {
        let name = info.name.unwrap_or_default();
        let tensor = match info.r#type.and_then(|t| t.value) {
            Some(TypeValue::TensorType(tensor)) => tensor,
            None => return Err(Error::Serialization(format!("value {} has no tensor type", name))),
        };
        let elem_type = ElemType::from_code(tensor.elem_type.unwrap_or_default())?;
        // Symbolic and missing extents are dynamic.
        let shape = tensor
            .shape
            .map(|s| s.dim)
            .unwrap_or_default()
            .into_iter()
            .map(|d| match d.value {
                Some(DimensionValue::DimValue(v)) if v > 0 => v,
                _ => -1,
            })
            .collect();
        Ok(Self { name, elem_type, shape })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_payloads_are_unpacked() -> Result<()> {
        let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let wire = TensorProto {
            dims: vec![2],
            data_type: Some(1),
            name: Some("w".to_string()),
            raw_data: Some(bytes),
            ..Default::default()
        };
        let tensor = proto::TensorProto::try_from(wire)?;
        assert_eq!(tensor.float_data, vec![1.5, -2.0]);
        assert_eq!(tensor.to_raw()?.to_vec_f32(), vec![1.5, -2.0]);

        let truncated = TensorProto {
            dims: vec![1],
            data_type: Some(7),
            raw_data: Some(vec![0; 5]),
            ..Default::default()
        };
        assert!(proto::TensorProto::try_from(truncated).is_err());
        Ok(())
    }

    #[test]
    fn untyped_attributes_are_inferred() -> Result<()> {
        let wire = AttributeProto {
            name: Some("alpha".to_string()),
            f: Some(0.25),
            ..Default::default()
        };
        let attr = proto::AttributeProto::try_from(wire)?;
        assert_eq!(attr.value, AttributeValue::Float(0.25));
        Ok(())
    }

    #[test]
    fn element_types_use_onnx_codes() -> Result<()> {
        let info = proto::ValueInfoProto::new("x", ElemType::Int64, &[2, 3]);
        let wire = ValueInfoProto::from(&info);
        match wire.r#type.as_ref().and_then(|t| t.value.as_ref()) {
            Some(TypeValue::TensorType(t)) => assert_eq!(t.elem_type, Some(7)),
            None => panic!("missing tensor type"),
        }
        assert_eq!(proto::ValueInfoProto::try_from(wire)?, info);

        let unknown = TensorProto {
            data_type: Some(11),
            ..Default::default()
        };
        assert!(proto::TensorProto::try_from(unknown).is_err());
        Ok(())
    }
}
