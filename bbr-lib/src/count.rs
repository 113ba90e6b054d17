use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

#[derive(Debug, Clone, Default)]
/// Counter for in-flight ext_proc streams, i.e. HTTP transactions currently
/// observed by the proxy
pub struct StreamCount(Arc<AtomicUsize>);

impl StreamCount {
  pub fn current(&self) -> usize {
    self.0.load(Ordering::Relaxed)
  }

  pub fn increment(&self) -> usize {
    self.0.fetch_add(1, Ordering::Relaxed)
  }

  pub fn decrement(&self) -> usize {
    let mut count;
    while {
      count = self.0.load(Ordering::Relaxed);
      count > 0
        && self
          .0
          .compare_exchange(count, count - 1, Ordering::Relaxed, Ordering::Relaxed)
          != Ok(count)
    } {}
    count
  }
}
