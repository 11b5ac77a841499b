mod binary;
mod matmul;
mod reduction;
mod transform;
mod unary;
