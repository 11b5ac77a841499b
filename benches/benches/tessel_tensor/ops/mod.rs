mod binary;
mod nn;
mod reduction;

use criterion::criterion_group;

criterion_group!(benches, binary::basic, reduction::basic, nn::basic);
