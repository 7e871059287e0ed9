// Domain layer: descriptor model and the ports to host collaborators (modules, module source, component factory).

pub mod model;
pub mod ports;
