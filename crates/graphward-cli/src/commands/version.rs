//! Version command.

pub fn run() {
    println!("graphward {}", env!("CARGO_PKG_VERSION"));
}
