use super::{apply, expect_inputs};
use crate::{
    mode::Mode,
    operation::{OpType, Operation},
    tensor::Tensor,
};
use tessel_core::error::Result;
use tessel_tensor::RawTensor;

/// Boolean-valued operators. No gradient flows through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalFn {
    Equal,
    Less,
    Greater,
    And,
    Or,
    Xor,
}

pub struct Logical {
    pub func: LogicalFn,
}

impl Logical {
    pub fn new(func: LogicalFn) -> Self {
        Self { func }
    }
}

impl Operation for Logical {
    fn op_type(&self) -> OpType {
        match self.func {
            LogicalFn::Equal => OpType::Equal,
            LogicalFn::Less => OpType::Less,
            LogicalFn::Greater => OpType::Greater,
            LogicalFn::And => OpType::And,
            LogicalFn::Or => OpType::Or,
            LogicalFn::Xor => OpType::Xor,
        }
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let xs = expect_inputs(xs, 2, self.op_type().name())?;
        let (a, b) = (&xs[0], &xs[1]);
        let y = match self.func {
            LogicalFn::Equal => a.equal(b)?,
            LogicalFn::Less => a.less(b)?,
            LogicalFn::Greater => a.greater(b)?,
            LogicalFn::And => a.logical_and(b)?,
            LogicalFn::Or => a.logical_or(b)?,
            LogicalFn::Xor => a.logical_xor(b)?,
        };
        Ok(vec![y])
    }

    fn backward(&self, _dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        Ok(vec![None, None])
    }
}

#[derive(Default)]
pub struct Not;

impl Operation for Not {
    fn op_type(&self) -> OpType {
        OpType::Not
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "Not")?[0];
        Ok(vec![x.logical_not()?])
    }

    fn backward(&self, _dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        Ok(vec![None])
    }
}

macro_rules! logical_fns {
    ($($name:ident => $func:ident),* $(,)?) => {
        $(
            pub fn $name(a: &Tensor, b: &Tensor) -> Result<Tensor> {
                apply(Logical::new(LogicalFn::$func), &[a, b], Mode::Train)
            }
        )*
    };
}

logical_fns!(
    equal => Equal,
    less => Less,
    greater => Greater,
    logical_and => And,
    logical_or => Or,
    logical_xor => Xor,
);

pub fn logical_not(x: &Tensor) -> Result<Tensor> {
    apply(Not, &[x], Mode::Train)
}
