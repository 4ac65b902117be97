//! Scoped pump session.
//!
//! [`PumpSession`] is returned by
//! [`PumpService::open_session`](super::service::PumpService::open_session)
//! and dereferences to the service. Dropping it releases the physical
//! channel on every exit path, including early returns and unwinding.

use core::ops::{Deref, DerefMut};

use super::ports::{Clock, PumpDriver};
use super::service::PumpService;

pub struct PumpSession<'a, D: PumpDriver, C: Clock> {
    service: &'a mut PumpService<D, C>,
}

impl<'a, D: PumpDriver, C: Clock> PumpSession<'a, D, C> {
    pub(super) fn new(service: &'a mut PumpService<D, C>) -> Self {
        Self { service }
    }
}

impl<D: PumpDriver, C: Clock> Deref for PumpSession<'_, D, C> {
    type Target = PumpService<D, C>;

    fn deref(&self) -> &Self::Target {
        self.service
    }
}

impl<D: PumpDriver, C: Clock> DerefMut for PumpSession<'_, D, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.service
    }
}

impl<D: PumpDriver, C: Clock> Drop for PumpSession<'_, D, C> {
    fn drop(&mut self) {
        self.service.close_session();
    }
}
