//! Text output through the managed runtime's standard output.
//!
//! Native code and the runtime may buffer standard output separately, which
//! interleaves their text unpredictably. [`JavaOutput`] routes native text
//! through `System.out` instead.

use std::fmt;
use std::io;

use crate::env;
use crate::error::{Error, Result};
use crate::refs::{LocalClassRef, LocalRef, Method};
use crate::sys::{JValue, JniEnv};

/// Buffered writer onto `System.out`.
///
/// Bytes are collected natively and handed to `PrintStream.print` on
/// [`sync`](JavaOutput::sync) and on drop. A UTF-8 sequence split across
/// writes is held back until it is complete.
pub struct JavaOutput<'env> {
    env: &'env JniEnv,
    out: LocalRef<'env>,
    print: Method,
    buffer: Vec<u8>,
}

impl<'env> JavaOutput<'env> {
    pub fn new(env: &'env JniEnv) -> Result<Self> {
        let system = LocalClassRef::find(env, "java/lang/System")?;
        let out = system.static_object_field("out", "Ljava/io/PrintStream;")?;
        if out.is_null() {
            return Err(Error::NullReference("java.io.PrintStream".into()));
        }
        let stream = LocalClassRef::find(env, "java/io/PrintStream")?;
        let print = stream.method("print", "(Ljava/lang/String;)V")?;

        Ok(Self {
            env,
            out,
            print,
            buffer: Vec::new(),
        })
    }

    /// Prints and clears the buffered text. An incomplete trailing UTF-8
    /// sequence stays buffered for the next write.
    pub fn sync(&mut self) -> Result<()> {
        let complete = match std::str::from_utf8(&self.buffer) {
            Ok(_) => self.buffer.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => self.buffer.len(),
        };
        let bytes: Vec<u8> = self.buffer.drain(..complete).collect();
        self.print_bytes(&bytes)
    }

    fn print_bytes(&self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8_lossy(bytes);
        let string = LocalRef::new(self.env, self.env.new_string_utf(&text));
        if string.is_null() {
            return Err(Error::pending_or(
                self.env,
                Error::Conversion("cannot create output string".into()),
            ));
        }
        self.print
            .call(self.env, self.out.as_obj(), &[JValue::Object(string.as_obj())])?;
        Ok(())
    }
}

impl fmt::Write for JavaOutput<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.buffer.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

impl io::Write for JavaOutput<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sync().map_err(io::Error::other)
    }
}

impl Drop for JavaOutput<'_> {
    fn drop(&mut self) {
        let rest = std::mem::take(&mut self.buffer);
        if let Err(err) = self.print_bytes(&rest) {
            log::warn!("discarding native output: {}", err);
        }
    }
}

#[doc(hidden)]
pub fn print_fmt(args: fmt::Arguments<'_>, newline: bool) {
    let Some(env) = env::this_thread() else {
        log::error!("no runtime environment on this thread; output dropped");
        return;
    };

    let result = JavaOutput::new(&*env).and_then(|mut out| {
        fmt::Write::write_fmt(&mut out, args)
            .map_err(|_| Error::Conversion("formatting output failed".into()))?;
        if newline {
            out.buffer.push(b'\n');
        }
        out.sync()
    });
    if let Err(err) = result {
        log::warn!("printing to the managed runtime failed: {}", err);
    }
}

/// Prints to `System.out` of the managed runtime.
#[macro_export]
macro_rules! java_print {
    ($($arg:tt)*) => {
        $crate::output::print_fmt(::std::format_args!($($arg)*), false)
    };
}

/// Prints to `System.out` of the managed runtime, with a newline.
#[macro_export]
macro_rules! java_println {
    () => {
        $crate::output::print_fmt(::std::format_args!(""), true)
    };
    ($($arg:tt)*) => {
        $crate::output::print_fmt(::std::format_args!($($arg)*), true)
    };
}
