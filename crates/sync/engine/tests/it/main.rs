#![allow(missing_docs)]

mod cancel;
mod sync;

const fn main() {}
