use crate::SharedError;

/// Sink for the three kinds of notifications an observable pushes.
///
/// A conforming sequence is zero or more `next` calls followed by at most one of
/// `error` or `complete`. Nothing may follow a terminal notification.
pub trait Observer {
    type NextFnType;

    fn next(&mut self, _: Self::NextFnType);
    fn complete(&mut self);
    fn error(&mut self, _: SharedError);
}
