/// DSL macros for building test histories.
///
/// # Syntax
///
/// ```ignore
/// history![
///     op!(ok [append x 1] [r y nil]),      // committed, no process
///     op!(info @2 [append x 2]),           // indeterminate, process 2
///     op!(ok [r x [1 2]] [r z 3] [w z 4]), // list read, register read, write
/// ]
/// ```
///
/// `history!` numbers the ops by position.
///
/// Build a single Mop.
#[macro_export]
macro_rules! mop {
    (r $key:ident nil) => {
        cyclops_core::history::types::Mop::read_nil(stringify!($key))
    };
    (r $key:ident [$($element:literal)*]) => {
        cyclops_core::history::types::Mop::read_list(stringify!($key), vec![$($element),*])
    };
    (r $key:ident $value:literal) => {
        cyclops_core::history::types::Mop::read_int(stringify!($key), $value)
    };
    (append $key:ident $value:literal) => {
        cyclops_core::history::types::Mop::append(stringify!($key), $value)
    };
    (w $key:ident $value:literal) => {
        cyclops_core::history::types::Mop::write(stringify!($key), $value)
    };
}

/// Map an outcome keyword to its `OpType`.
#[macro_export]
macro_rules! op_type {
    (invoke) => {
        cyclops_core::history::types::OpType::Invoke
    };
    (ok) => {
        cyclops_core::history::types::OpType::Ok
    };
    (fail) => {
        cyclops_core::history::types::OpType::Fail
    };
    (info) => {
        cyclops_core::history::types::OpType::Info
    };
}

/// Build an Op: outcome, optional `@process`, then bracketed mops.
#[macro_export]
macro_rules! op {
    ($kind:ident $(@ $process:literal)? $([$($mop:tt)*])*) => {
        cyclops_core::history::types::Op::new(
            $crate::op_type!($kind),
            vec![$($crate::mop!($($mop)*)),*],
        )
        $(.with_process($process))?
    };
}

/// Build a history: a `Vec<Op>` indexed by position.
#[macro_export]
macro_rules! history {
    ($($op:expr),* $(,)?) => {
        vec![$($op),*]
            .into_iter()
            .enumerate()
            .map(|(i, op): (usize, cyclops_core::history::types::Op)| op.with_index(i as u64))
            .collect::<Vec<_>>()
    };
}
