pub mod settlementmodels;
