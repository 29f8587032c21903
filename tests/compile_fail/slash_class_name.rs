//! Class names are written in dotted form.
#![allow(dead_code)]

use ktbind::NativeClass;

#[derive(NativeClass)]
#[ktbind(class = "com/example/Socket")]
pub struct Socket;

fn main() {}
