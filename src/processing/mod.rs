pub mod densities;
