pub mod fixtures;

#[cfg(test)]
mod admission_tests;
#[cfg(test)]
mod breakout_tests;
#[cfg(test)]
mod health_tests;
#[cfg(test)]
mod qa_tests;
#[cfg(test)]
mod signaling_tests;
