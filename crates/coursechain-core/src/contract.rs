//! ABI bindings for the course market contract.
//!
//! Generated at compile time by `sol!`; every call struct implements
//! [`alloy_sol_types::SolCall`] and every event [`alloy_sol_types::SolEvent`].

use alloy_sol_types::sol;

sol! {
    interface ICourseMarket {
        event CourseCreated(
            uint256 indexed courseId,
            string title,
            address indexed author,
            uint256 price
        );
        event CoursePurchased(uint256 indexed courseId, address indexed buyer, uint256 price);

        function createCourse(string _title, string _description, uint256 _price)
            external
            returns (uint256);
        function purchaseCourse(uint256 _courseId) external payable;
        function getCourse(uint256 _courseId)
            external
            view
            returns (
                string title,
                string description,
                address author,
                uint256 price,
                uint256 createdAt
            );
        function getCourseBuyers(uint256 _courseId) external view returns (address[]);
        function getUserPurchasedCourses(address _user) external view returns (uint256[]);
        function hasUserPurchasedCourse(uint256 _courseId, address _user)
            external
            view
            returns (bool);
        function getCourseCount() external view returns (uint256);
        function courseCounter() external view returns (uint256);
    }
}

pub use ICourseMarket::{
    courseCounterCall, createCourseCall, getCourseBuyersCall, getCourseCall, getCourseCountCall,
    getUserPurchasedCoursesCall, hasUserPurchasedCourseCall, purchaseCourseCall, CourseCreated,
    CoursePurchased, ICourseMarketCalls,
};
