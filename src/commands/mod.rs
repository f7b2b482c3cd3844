pub mod crawl;
pub mod harvest;
pub mod status;

// Re-export command functions for convenience
pub use crawl::crawl;
pub use harvest::harvest;
pub use status::status;

use coletor::harvester::HarvestSummary;

fn print_harvest_summary(summary: &HarvestSummary) {
    println!("\nAPI Harvest Summary");
    println!("===================");
    println!("Endpoints: {}", summary.endpoints);
    println!("Complete: {}", summary.successful);
    println!("Already complete: {}", summary.skipped);
    println!("Failed: {}", summary.failed);
    println!("Records: {}", summary.records);
}
