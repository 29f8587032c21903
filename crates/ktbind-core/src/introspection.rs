//! Kotlin declarations matching the registered bindings.
//!
//! The listing can be pasted into a Kotlin source file as the managed
//! counterpart of the extension: one class per native class with `external`
//! members and a companion object of `@JvmStatic` functions, and one data
//! class per registered data class.

use std::fmt::{self, Write};

use crate::bindings;
use crate::env;
use crate::error::{Error, Result};
use crate::output::JavaOutput;
use crate::signature::simple_name;

const NATIVE_OBJECT: &str = "\
/** Represents a class that is instantiated in native code. */
abstract class NativeObject : AutoCloseable {
    /** Holds an opaque reference to an object that exists in the native code execution context. */
    @Suppress(\"unused\") private val nativePointer: Long = 0
}

";

/// Writes the declaration listing to `out`.
pub fn write_registered_bindings(out: &mut impl Write) -> fmt::Result {
    out.write_str(NATIVE_OBJECT)?;

    for (class_name, functions) in bindings::function_bindings() {
        writeln!(
            out,
            "class {} private constructor() : NativeObject() {{",
            simple_name(&class_name)
        )?;
        for binding in functions.iter().filter(|b| b.is_member) {
            writeln!(out, "    external fun {}{}", binding.name, binding.kotlin_signature)?;
        }
        writeln!(out, "    companion object {{")?;
        for binding in functions.iter().filter(|b| !b.is_member) {
            writeln!(
                out,
                "        @JvmStatic external fun {}{}",
                binding.name, binding.kotlin_signature
            )?;
        }
        writeln!(out, "    }}")?;
        writeln!(out, "}}")?;
    }

    for data in bindings::data_class_bindings().into_values() {
        writeln!(out)?;
        writeln!(out, "data class {}(", simple_name(data.class_name))?;
        for field in data.fields.iter() {
            writeln!(out, "    val {}: {},", field.name, field.kotlin_type)?;
        }
        writeln!(out, ")")?;
    }
    Ok(())
}

/// The declaration listing as a string.
pub fn registered_bindings() -> String {
    let mut listing = String::new();
    // Formatting into a `String` does not fail.
    let _ = write_registered_bindings(&mut listing);
    listing
}

/// Prints the declaration listing to `System.out` of the managed runtime.
pub fn print_registered_bindings() -> Result<()> {
    let env = env::this_thread().ok_or(Error::EnvironmentUnavailable)?;
    let mut output = JavaOutput::new(&*env)?;
    write_registered_bindings(&mut output)
        .map_err(|_| Error::Conversion("formatting the binding listing failed".into()))?;
    output.sync()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::FunctionBinding;
    use crate::sys::{JObject, JValue, JniEnv, NativeFn};

    fn binding(name: &str, is_member: bool, kotlin: &str) -> FunctionBinding {
        FunctionBinding {
            name: name.to_owned(),
            signature: "()V".to_owned(),
            is_member,
            entry: NativeFn::new(|_: &JniEnv, _: JObject, _: &[JValue]| JValue::Void),
            kotlin_signature: kotlin.to_owned(),
        }
    }

    #[test]
    fn listing_renders_members_and_companion() {
        bindings::register_function("com/example/listing/Probe", binding("close", true, "(): Unit"));
        bindings::register_function(
            "com/example/listing/Probe",
            binding("create", false, "(arg0: Int): com.example.listing.Probe"),
        );

        let listing = registered_bindings();
        assert!(listing.starts_with("/** Represents a class that is instantiated in native code. */"));
        assert!(listing.contains(
            "class Probe private constructor() : NativeObject() {\n\
             \x20   external fun close(): Unit\n\
             \x20   companion object {\n\
             \x20       @JvmStatic external fun create(arg0: Int): com.example.listing.Probe\n\
             \x20   }\n\
             }\n"
        ));
    }
}
