use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods, fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, written with `/` separators (eg. `java/lang/Object`)
///
/// Array classes are also named this way using their descriptor (eg. `[I`), since the loader
/// treats them as ordinary classes once synthesized.
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct BinaryName(Cow<'static, str>);

impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extract the raw underlying string data
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extract the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(format!("Unqualified name '{}' is empty", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(UnqualifiedName(Cow::Owned(name)))
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(format!("Binary name '{}' is empty", name))
        } else if name.starts_with('[') {
            // Array names are their own descriptors
            let element = name.trim_start_matches('[');
            match element.chars().next() {
                Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') if element.len() == 1 => Ok(()),
                Some('L') if element.ends_with(';') => {
                    BinaryName::check_valid(&element[1..element.len() - 1])
                }
                _ => Err(format!("Array name '{}' is malformed", name)),
            }
        } else {
            name.split('/').map(UnqualifiedName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl UnqualifiedName {
    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    /// Name from a literal known to be valid (used for built-in classes)
    pub(crate) const fn from_static(value: &'static str) -> UnqualifiedName {
        Self::name(value)
    }

    /// Is this one of the two special initializer names?
    pub fn is_initializer(&self) -> bool {
        self == &Self::INIT || self == &Self::CLINIT
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");

    pub const MAIN: Self = Self::name("main");
    pub const MESSAGE: Self = Self::name("message");
    pub const VALUE: Self = Self::name("value");
}

impl BinaryName {
    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    /// Name from a literal known to be valid (used for built-in classes)
    pub(crate) const fn from_static(value: &'static str) -> BinaryName {
        Self::name(value)
    }

    /// Is this the name of an array class?
    pub fn is_array(&self) -> bool {
        self.as_str().starts_with('[')
    }

    /// Package portion of the name (everything before the last `/`, empty for the default
    /// package). Arrays live in the package of their innermost element class.
    pub fn package(&self) -> &str {
        let name = self.as_str().trim_start_matches('[');
        let name = name
            .strip_prefix('L')
            .and_then(|n| n.strip_suffix(';'))
            .unwrap_or(name);
        match name.rfind('/') {
            Some(idx) => &name[..idx],
            None => "",
        }
    }

    /// Name as it appears in guest source code (`java.lang.Object`)
    pub fn to_source_name(&self) -> String {
        self.as_str().replace('/', ".")
    }

    /// Parse a source-style name (`java.lang.Object`) back into a binary name
    pub fn from_source_name(name: &str) -> Result<BinaryName, String> {
        BinaryName::from_string(name.replace('.', "/"))
    }

    // Core classes
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const SYSTEM: Self = Self::name("java/lang/System");
    pub const THREAD: Self = Self::name("java/lang/Thread");
    pub const CLONEABLE: Self = Self::name("java/lang/Cloneable");
    pub const SERIALIZABLE: Self = Self::name("java/io/Serializable");

    // Boxes
    pub const BOOLEAN: Self = Self::name("java/lang/Boolean");
    pub const BYTE: Self = Self::name("java/lang/Byte");
    pub const CHARACTER: Self = Self::name("java/lang/Character");
    pub const SHORT: Self = Self::name("java/lang/Short");
    pub const INTEGER: Self = Self::name("java/lang/Integer");
    pub const LONG: Self = Self::name("java/lang/Long");
    pub const FLOAT: Self = Self::name("java/lang/Float");
    pub const DOUBLE: Self = Self::name("java/lang/Double");
    pub const NUMBER: Self = Self::name("java/lang/Number");

    // Throwables
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");
    pub const EXCEPTION: Self = Self::name("java/lang/Exception");
    pub const ERROR: Self = Self::name("java/lang/Error");
    pub const RUNTIMEEXCEPTION: Self = Self::name("java/lang/RuntimeException");
    pub const ARITHMETICEXCEPTION: Self = Self::name("java/lang/ArithmeticException");
    pub const INDEXOUTOFBOUNDSEXCEPTION: Self = Self::name("java/lang/IndexOutOfBoundsException");
    pub const ARRAYINDEXOUTOFBOUNDSEXCEPTION: Self =
        Self::name("java/lang/ArrayIndexOutOfBoundsException");
    pub const ARRAYSTOREEXCEPTION: Self = Self::name("java/lang/ArrayStoreException");
    pub const CLASSCASTEXCEPTION: Self = Self::name("java/lang/ClassCastException");
    pub const ILLEGALMONITORSTATEEXCEPTION: Self =
        Self::name("java/lang/IllegalMonitorStateException");
    pub const INTERRUPTEDEXCEPTION: Self = Self::name("java/lang/InterruptedException");
    pub const NEGATIVEARRAYSIZEEXCEPTION: Self =
        Self::name("java/lang/NegativeArraySizeException");
    pub const NULLPOINTEREXCEPTION: Self = Self::name("java/lang/NullPointerException");
    pub const ABSTRACTMETHODERROR: Self = Self::name("java/lang/AbstractMethodError");
    pub const ILLEGALACCESSERROR: Self = Self::name("java/lang/IllegalAccessError");
    pub const INCOMPATIBLECLASSCHANGEERROR: Self =
        Self::name("java/lang/IncompatibleClassChangeError");
    pub const INSTANTIATIONERROR: Self = Self::name("java/lang/InstantiationError");
    pub const LINKAGEERROR: Self = Self::name("java/lang/LinkageError");
    pub const NOCLASSDEFFOUNDERROR: Self = Self::name("java/lang/NoClassDefFoundError");
    pub const NOSUCHFIELDERROR: Self = Self::name("java/lang/NoSuchFieldError");
    pub const NOSUCHMETHODERROR: Self = Self::name("java/lang/NoSuchMethodError");
    pub const VIRTUALMACHINEERROR: Self = Self::name("java/lang/VirtualMachineError");
    pub const OUTOFMEMORYERROR: Self = Self::name("java/lang/OutOfMemoryError");

    // Engine intrinsics
    pub const INTRINSICS: Self = Self::name("jmevm/runtime/Intrinsics");
    pub const OBJECTACCESS: Self = Self::name("jmevm/runtime/ObjectAccess");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validity() {
        assert!(BinaryName::check_valid("java/lang/Object").is_ok());
        assert!(BinaryName::check_valid("[I").is_ok());
        assert!(BinaryName::check_valid("[[Ljava/lang/String;").is_ok());
        assert!(BinaryName::check_valid("[Q").is_err(), "bad array element");
        assert!(BinaryName::check_valid("java//Object").is_err(), "empty segment");
        assert!(UnqualifiedName::check_valid("a.b").is_err(), "dot in member name");
    }

    #[test]
    fn packages() {
        assert_eq!(BinaryName::STRING.package(), "java/lang");
        assert_eq!(
            BinaryName::from_string("Main".to_string()).unwrap().package(),
            ""
        );
        assert_eq!(
            BinaryName::from_string("[[Lfoo/Bar;".to_string())
                .unwrap()
                .package(),
            "foo"
        );
        assert_eq!(BinaryName::INTEGER.to_source_name(), "java.lang.Integer");
    }
}
