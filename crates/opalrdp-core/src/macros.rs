//! Helper macros shared by all codec crates.

/// Expands to the path of the enclosing function.
///
/// Used as the error context so that failures point at the codec which
/// rejected the input.
#[macro_export]
macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            core::any::type_name::<T>()
        }
        let name = type_name_of(f);
        name.strip_suffix("::f").unwrap_or(name)
    }};
}

#[macro_export]
macro_rules! ensure_size {
    (ctx: $ctx:expr, in: $buf:ident, size: $expected:expr) => {{
        let received = $buf.len();
        let expected = $expected;
        if !(received >= expected) {
            return Err($crate::not_enough_bytes_err($ctx, received, expected));
        }
    }};
    (in: $buf:ident, size: $expected:expr) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: $expected)
    }};
}

#[macro_export]
macro_rules! ensure_fixed_part_size {
    (in: $buf:ident) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: Self::FIXED_PART_SIZE)
    }};
}

#[macro_export]
macro_rules! cast_length {
    ($ctx:expr, $field:expr, $len:expr) => {{
        $len.try_into()
            .map_err(|_| $crate::invalid_field_err($ctx, $field, "too many elements"))
    }};
    ($field:expr, $len:expr) => {{
        $crate::cast_length!($crate::function!(), $field, $len)
    }};
}

#[macro_export]
macro_rules! invalid_field_err {
    ($field:expr, $reason:expr $(,)?) => {{
        $crate::invalid_field_err($crate::function!(), $field, $reason)
    }};
}

#[macro_export]
macro_rules! unexpected_message_type_err {
    ($got:expr $(,)?) => {{
        $crate::unexpected_message_type_err($crate::function!(), $got)
    }};
}

#[macro_export]
macro_rules! unsupported_version_err {
    ($got:expr $(,)?) => {{
        $crate::unsupported_version_err($crate::function!(), $got)
    }};
}

#[macro_export]
macro_rules! other_err {
    ($description:expr, source: $source:expr $(,)?) => {{
        $crate::other_err_with_source($crate::function!(), $description, $source)
    }};
    ($description:expr $(,)?) => {{
        $crate::other_err($crate::function!(), $description)
    }};
}

#[macro_export]
macro_rules! read_padding {
    ($buf:ident, $n:expr) => {{
        $buf.advance($n);
    }};
}

#[macro_export]
macro_rules! write_padding {
    ($buf:ident, $n:expr) => {{
        let n = $n;
        for _ in 0..n {
            $buf.write_u8(0);
        }
    }};
}

/// Asserts that the traits support dynamic dispatch.
#[macro_export]
macro_rules! assert_obj_safe {
    ($($xs:path),+ $(,)?) => {
        $(const _: Option<&dyn $xs> = None;)+
    };
}

/// Asserts that the type implements _all_ of the given traits.
#[macro_export]
macro_rules! assert_impl {
    ($type:ty: $($trait:path),+ $(,)?) => {
        const _: fn() = || {
            fn assert_impl_all<T: ?Sized $(+ $trait)+>() {}
            assert_impl_all::<$type>();
        };
    };
}
