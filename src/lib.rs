pub use tessel_internal::*;
