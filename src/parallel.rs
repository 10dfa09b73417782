//! Data-parallel execution over the rayon worker pool.
//!
//! A device id names one worker slot of the current rayon pool. The
//! wrapper splits the batch along its first axis into one chunk per device,
//! runs the chunks concurrently and concatenates the outputs in order.

use ndarray::{concatenate, Array4, ArrayView4, Axis};
use rayon::prelude::*;
use tracing::debug;

use crate::error::{NetError, Result};
use crate::layers::{LayerKind, Module};

/// Number of devices a network can be spread over
pub fn available_devices() -> usize {
    rayon::current_num_threads()
}

/// Check that every id names an available device and none is repeated.
pub fn validate_devices(device_ids: &[usize]) -> Result<()> {
    let available = available_devices();
    for (i, &id) in device_ids.iter().enumerate() {
        if id >= available {
            return Err(NetError::Device(format!(
                "device {} is not available ({} devices)",
                id, available
            )));
        }
        if device_ids[..i].contains(&id) {
            return Err(NetError::Device(format!("device {} listed more than once", id)));
        }
    }
    Ok(())
}

/// Runs a module on several devices at once.
///
/// The wrapped module is the master replica: it processes the first chunk,
/// so state it updates while running (batch statistics, spectral-norm
/// vectors) persists. The remaining chunks run on fresh copies made for the
/// call. Each replica is told which rows of the batch it holds, and results
/// that span the batch, such as the guidance loss, are merged back into the
/// master afterwards.
#[derive(Debug)]
pub struct DataParallel {
    module: Box<dyn Module>,
    device_ids: Vec<usize>,
}

impl DataParallel {
    pub fn new(module: Box<dyn Module>, device_ids: &[usize]) -> Result<Self> {
        if device_ids.is_empty() {
            return Err(NetError::Device("no devices given".to_string()));
        }
        validate_devices(device_ids)?;
        Ok(DataParallel {
            module,
            device_ids: device_ids.to_vec(),
        })
    }

    pub fn device_ids(&self) -> &[usize] {
        &self.device_ids
    }

    /// The master replica
    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }

    pub fn module_mut(&mut self) -> &mut dyn Module {
        self.module.as_mut()
    }

    pub fn into_inner(self) -> Box<dyn Module> {
        self.module
    }
}

impl Clone for DataParallel {
    fn clone(&self) -> Self {
        DataParallel {
            module: self.module.clone_box(),
            device_ids: self.device_ids.clone(),
        }
    }
}

impl Module for DataParallel {
    fn kind(&self) -> LayerKind {
        LayerKind::Container
    }

    fn name(&self) -> String {
        format!("DataParallel(device_ids={:?})", self.device_ids)
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let batch_size = input.len_of(Axis(0));
        if batch_size == 0 {
            return Err(NetError::dimension_mismatch(
                "a non-empty batch".to_string(),
                format!("{:?}", input.shape()),
            ));
        }

        // ceil split: small batches use fewer devices
        let chunk_size = (batch_size + self.device_ids.len() - 1) / self.device_ids.len();
        let chunks: Vec<ArrayView4<f32>> = input.axis_chunks_iter(Axis(0), chunk_size).collect();
        if chunks.len() < 2 {
            return self.module.forward(input);
        }
        debug!("scattering batch of {} over {} devices", batch_size, chunks.len());

        let rows = |i: usize| i * chunk_size..i * chunk_size + chunks[i].len_of(Axis(0));
        self.module.set_batch_slice(Some(rows(0)));
        let replicas: Vec<Box<dyn Module>> = (1..chunks.len())
            .map(|i| {
                let mut replica = self.module.clone_box();
                replica.set_batch_slice(Some(rows(i)));
                replica
            })
            .collect();

        let first = chunks[0].clone();
        let rest = chunks[1..].to_vec();
        let master = &mut self.module;
        let (head, tail) = rayon::join(
            || master.forward(first),
            || {
                replicas
                    .into_par_iter()
                    .zip(rest.into_par_iter())
                    .map(|(mut replica, chunk)| replica.forward(chunk))
                    .collect::<Result<Vec<_>>>()
            },
        );
        self.module.merge_batch_slices(head.is_ok() && tail.is_ok());

        let mut outputs = vec![head?];
        outputs.extend(tail?);
        let views: Vec<ArrayView4<f32>> = outputs.iter().map(|o| o.view()).collect();
        concatenate(Axis(0), &views).map_err(|e| {
            NetError::dimension_mismatch("replica outputs of matching shape".to_string(), e.to_string())
        })
    }

    fn for_each_child(&self, f: &mut dyn FnMut(&dyn Module)) {
        f(self.module.as_ref());
    }

    fn for_each_child_mut(&mut self, f: &mut dyn FnMut(&mut dyn Module)) {
        f(self.module.as_mut());
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}
