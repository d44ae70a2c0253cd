pub mod jobservice;
pub mod repository;
pub mod scheduler;

pub use jobservice::JobServiceClient;
pub use repository::{ExecutionRepository, ScheduleRepository, TaskRepository};
pub use scheduler::{ExecutionService, SchedulerService, TaskService};
