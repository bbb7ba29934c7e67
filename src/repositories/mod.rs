pub mod grades;
