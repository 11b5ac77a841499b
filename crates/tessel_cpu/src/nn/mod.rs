pub mod batchnorm;
pub mod conv;
pub mod pooling;
pub mod softmax;
