//! Fixed operator-name tables between internal type names and interchange op
//! types. Names missing from a table pass through unchanged.

use crate::proto::ElemType;

/// internal type name -> interchange op type
const EXPORT_NAMES: &[(&str, &str)] = &[
    ("Conv2d", "Conv"),
    ("ReLU", "Relu"),
    ("Dummy", "Constant"),
    ("SoftMax", "Softmax"),
    ("Matmul", "MatMul"),
    ("BatchNorm2d", "BatchNormalization"),
    ("AddBias", "Add"),
    ("cos", "Cos"),
    ("cosh", "Cosh"),
    ("sin", "Sin"),
    ("sinh", "Sinh"),
    ("tan", "Tan"),
    ("acos", "Acos"),
    ("acosh", "Acosh"),
    ("asin", "Asin"),
    ("asinh", "Asinh"),
    ("atan", "Atan"),
    ("atanh", "Atanh"),
    ("SeLU", "Selu"),
    ("SoftPlus", "Softplus"),
    ("SoftSign", "Softsign"),
    ("Negative", "Neg"),
];

/// interchange op type -> internal type name
const IMPORT_NAMES: &[(&str, &str)] = &[
    ("Conv", "Conv2d"),
    ("MaxPool", "Pooling2d"),
    ("AveragePool", "Pooling2d"),
    ("Relu", "ReLU"),
    ("Constant", "Dummy"),
    ("Softmax", "SoftMax"),
    ("MatMul", "Matmul"),
    ("BatchNormalization", "BatchNorm2d"),
    ("Cos", "cos"),
    ("Cosh", "cosh"),
    ("Sin", "sin"),
    ("Sinh", "sinh"),
    ("Tan", "tan"),
    ("Acos", "acos"),
    ("Acosh", "acosh"),
    ("Asin", "asin"),
    ("Asinh", "asinh"),
    ("Atan", "atan"),
    ("Atanh", "atanh"),
    ("Selu", "SeLU"),
    ("Softplus", "SoftPlus"),
    ("Softsign", "SoftSign"),
    ("Neg", "Negative"),
];

/// Internal types whose interchange output is not `FLOAT`.
const OUTPUT_TYPES: &[(&str, ElemType)] = &[
    ("Equal", ElemType::Bool),
    ("Greater", ElemType::Bool),
    ("Less", ElemType::Bool),
    ("And", ElemType::Bool),
    ("Not", ElemType::Bool),
    ("Or", ElemType::Bool),
    ("Xor", ElemType::Bool),
    ("Shape", ElemType::Int64),
];

fn lookup<'a>(table: &[(&'static str, &'a str)], name: &'a str) -> &'a str {
    table.iter().find(|(from, _)| *from == name).map_or(name, |(_, to)| *to)
}

pub fn to_onnx_name(internal: &str) -> &str {
    lookup(EXPORT_NAMES, internal)
}

pub fn from_onnx_name(op_type: &str) -> &str {
    lookup(IMPORT_NAMES, op_type)
}

pub fn output_elem_type(internal: &str) -> ElemType {
    OUTPUT_TYPES
        .iter()
        .find(|(name, _)| *name == internal)
        .map_or(ElemType::Float, |(_, t)| *t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_map_both_ways() {
        for (internal, onnx) in EXPORT_NAMES {
            if *internal == "AddBias" {
                continue;
            }
            assert_eq!(from_onnx_name(onnx), *internal);
        }
        assert_eq!(to_onnx_name("Gemm"), "Gemm");
        assert_eq!(from_onnx_name("Gemm"), "Gemm");
    }

    #[test]
    fn output_types() {
        assert_eq!(output_elem_type("Less"), ElemType::Bool);
        assert_eq!(output_elem_type("Shape"), ElemType::Int64);
        assert_eq!(output_elem_type("ReLU"), ElemType::Float);
    }
}
