pub mod webhookdtos;
